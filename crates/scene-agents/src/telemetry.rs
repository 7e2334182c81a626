//! Structured run log and telemetry sink.
//!
//! Every step of a run appends a [`LogEntry`]; the finished [`RunLog`] travels
//! back to the caller inside the artifact or the terminal error. A one-line
//! summary of each run is also appended to `.scene-telemetry.jsonl` in the
//! output directory.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::prompts::PROMPT_VERSION;

/// File name of the append-only telemetry log inside the output directory.
pub const TELEMETRY_FILE: &str = ".scene-telemetry.jsonl";

/// Phase of the run a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Outline,
    Generation,
    Validation,
    Render,
    Finish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Outline => write!(f, "outline"),
            Self::Generation => write!(f, "generation"),
            Self::Validation => write!(f, "validation"),
            Self::Render => write!(f, "render"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Failed,
}

/// One immutable log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Attempt number (0 before the retry loop starts)
    pub attempt: u32,
    pub phase: Phase,
    pub outcome: Outcome,
    pub summary: String,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.outcome {
            Outcome::Ok => "ok",
            Outcome::Failed => "FAILED",
        };
        if self.attempt == 0 {
            write!(f, "[{}] {}: {}", self.phase, status, self.summary)
        } else {
            write!(
                f,
                "[attempt {} {}] {}: {}",
                self.attempt, self.phase, status, self.summary
            )
        }
    }
}

/// Ordered, append-only log of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    entries: Vec<LogEntry>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            started: Some(Instant::now()),
        }
    }

    fn push(&mut self, attempt: u32, phase: Phase, outcome: Outcome, summary: impl Into<String>) {
        let elapsed_ms = self
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let entry = LogEntry {
            attempt,
            phase,
            outcome,
            summary: summary.into(),
            elapsed_ms,
        };
        tracing::info!(attempt, phase = %phase, outcome = ?outcome, "{}", entry.summary);
        self.entries.push(entry);
    }

    pub fn ok(&mut self, attempt: u32, phase: Phase, summary: impl Into<String>) {
        self.push(attempt, phase, Outcome::Ok, summary);
    }

    pub fn failed(&mut self, attempt: u32, phase: Phase, summary: impl Into<String>) {
        self.push(attempt, phase, Outcome::Failed, summary);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries recorded for a phase.
    pub fn count_phase(&self, phase: Phase) -> usize {
        self.entries.iter().filter(|e| e.phase == phase).count()
    }

    /// Highest attempt number seen.
    pub fn attempts(&self) -> u32 {
        self.entries.iter().map(|e| e.attempt).max().unwrap_or(0)
    }

    /// Human-readable lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

/// Summary of one finished run, appended to the telemetry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub topic: String,
    pub success: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Category of each failed attempt, in order
    pub failure_categories: Vec<String>,
    pub prompt_version: String,
    pub timestamp: String,
}

impl RunRecord {
    pub fn new(
        run_id: &str,
        topic: &str,
        success: bool,
        attempts: u32,
        duration_ms: u64,
        failure_categories: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            topic: topic.to_string(),
            success,
            attempts,
            duration_ms,
            failure_categories,
            prompt_version: PROMPT_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Append a run record as one JSON line. Failures are logged, never raised.
pub fn append_run_record(output_dir: &Path, record: &RunRecord) {
    let path = output_dir.join(TELEMETRY_FILE);
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to serialize run record: {e}");
            return;
        }
    };

    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{line}"));

    if let Err(e) = result {
        warn!(path = %path.display(), "Failed to append telemetry: {e}");
    }
}
