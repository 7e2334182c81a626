//! Error taxonomy for the generate/validate/render loop.
//!
//! Recoverable failures (`AttemptFailure`) never reach the caller: they are
//! converted into feedback for the next attempt. Only `RunError` crosses the
//! loop boundary.
//!
//! | Failure              | Recoverable | Surfaces as                   |
//! |----------------------|-------------|-------------------------------|
//! | Outline generation   | no          | `RunError::Outline`           |
//! | Code generation      | yes         | feedback, attempt consumed    |
//! | Syntax validation    | yes         | feedback, renderer skipped    |
//! | Render               | yes         | classified feedback           |
//! | Budget exhausted     | no          | `RunError::MaxAttemptsExceeded` |

use std::path::PathBuf;

use gates::{ClassifiedFailure, FailureCategory, SyntaxIssue};
use thiserror::Error;

use crate::state_machine::IllegalTransition;
use crate::telemetry::RunLog;

/// Failure of the upstream text-generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Request failed (network, auth, rate limit, backend error).
    #[error("text generation request failed: {0}")]
    Upstream(String),

    /// Service answered with nothing usable.
    #[error("text generation returned empty content")]
    Empty,
}

/// Why one attempt failed. Always recoverable inside the attempt budget.
#[derive(Debug, Clone, Error)]
pub enum AttemptFailure {
    #[error("code generation failed: {0}")]
    Generation(GenerationError),

    #[error("{0}")]
    Syntax(SyntaxIssue),

    #[error("render failed ({}): {}", .0.category, .0.feedback)]
    Render(ClassifiedFailure),
}

impl AttemptFailure {
    /// Feedback text for the next code-generation call. Never empty.
    pub fn feedback(&self) -> String {
        match self {
            Self::Generation(e) => format!("Error: {e}. Return a complete script in a python block."),
            Self::Syntax(issue) => issue.format_for_feedback(),
            Self::Render(failure) => failure.feedback.clone(),
        }
    }

    /// Short category label for logs and telemetry.
    pub fn category(&self) -> String {
        match self {
            Self::Generation(_) => "generation".to_string(),
            Self::Syntax(issue) => format!("syntax:{}", issue.kind),
            Self::Render(failure) => format!("render:{}", failure.category),
        }
    }

    pub fn render_category(&self) -> Option<&FailureCategory> {
        match self {
            Self::Render(failure) => Some(&failure.category),
            _ => None,
        }
    }
}

/// Terminal outcome of a run that produced no artifact.
#[derive(Debug, Error)]
pub enum RunError {
    /// Topic empty after stripping the request marker.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Outline generation failed; no attempts were made.
    #[error("outline generation failed: {source}")]
    Outline {
        #[source]
        source: GenerationError,
        log: RunLog,
    },

    /// Every attempt failed.
    #[error("failed to generate video after {attempts} attempts; last failure: {last_failure}")]
    MaxAttemptsExceeded {
        attempts: u32,
        last_failure: String,
        log: RunLog,
        /// Scratch scripts kept for postmortem
        retained_scripts: Vec<PathBuf>,
    },

    /// Filesystem failure in the managed output directory.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
        log: RunLog,
    },

    /// The loop controller tried an edge outside the state graph.
    #[error("internal loop error: {source}")]
    IllegalTransition {
        #[source]
        source: IllegalTransition,
        log: RunLog,
    },
}

impl RunError {
    /// The run log, when the run got far enough to have one.
    pub fn log(&self) -> Option<&RunLog> {
        match self {
            Self::InvalidTopic(_) => None,
            Self::Outline { log, .. }
            | Self::MaxAttemptsExceeded { log, .. }
            | Self::Io { log, .. }
            | Self::IllegalTransition { log, .. } => Some(log),
        }
    }

    /// Whether the caller's input was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidTopic(_))
    }
}
