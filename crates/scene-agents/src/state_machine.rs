//! Loop state machine: explicit states and legal transition guards.
//!
//! Gives the render loop a typed state model so that every transition is
//! checked against the state graph and recorded for diagnostics. The loop
//! controller calls `advance()` to move between states.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// States of one generate/validate/render run.
///
/// Every run starts at `Init` and terminates at `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Output directory and run id being prepared.
    Init,
    /// Generating the outline (once per run).
    Outline,
    /// Asking the model for scene code.
    Generating,
    /// Parsing the script without executing it.
    Validating,
    /// External renderer running.
    Rendering,
    /// Video produced (terminal).
    Success,
    /// Outline failed or attempts exhausted (terminal).
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Outline => write!(f, "Outline"),
            Self::Generating => write!(f, "Generating"),
            Self::Validating => write!(f, "Validating"),
            Self::Rendering => write!(f, "Rendering"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions:
/// ```text
/// Init → Outline | Failed
/// Outline → Generating | Failed
/// Generating → Validating | Generating | Failed
/// Validating → Rendering | Generating | Failed
/// Rendering → Success | Generating | Failed
/// ```
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, Outline)
            | (Outline, Generating)
            | (Generating, Validating)
            // Code generation failed inside the budget
            | (Generating, Generating)
            | (Validating, Rendering)
            | (Validating, Generating)
            | (Rendering, Success)
            | (Rendering, Generating)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Attempt number at the time of transition (0 before the loop).
    pub attempt: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// State of one render-loop run.
///
/// Holds the current [`LoopState`] and the attempt counter. Every edge is
/// checked against the state graph and appended to a transition history
/// that ends up in the run summary.
pub struct StateMachine {
    current: LoopState,
    attempt: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Start a run at `Init` with no attempts made.
    pub fn new() -> Self {
        Self {
            current: LoopState::Init,
            attempt: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// State the run is in now.
    pub fn current(&self) -> LoopState {
        self.current
    }

    /// Attempt in progress (0 until the retry loop starts).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record the start of attempt `attempt`; the loop controller calls this
    /// before each code-generation request.
    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Move to `to`.
    ///
    /// `reason` is kept in the transition record, typically the failure
    /// category that sent the run back to `Generating`. Edges outside the
    /// graph leave the state untouched and return `Err(IllegalTransition)`.
    pub fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            attempt = self.attempt,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            attempt: self.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// End the run as `Failed`. Legal from every non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(LoopState::Failed, Some(reason))
    }

    /// Whether the run reached `Success` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Every transition taken so far, oldest first.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history for the end-of-run log, e.g.
    /// `Init → Success after 2 attempt(s) (840ms) [Outline → Generating → ...]`.
    pub fn summary(&self) -> String {
        let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} after {} attempt(s) ({}ms)",
            LoopState::Init,
            self.current,
            self.attempt,
            self.created_at.elapsed().as_millis(),
        );
        if !path.is_empty() {
            summary.push_str(&format!(" [{}]", path.join(" → ")));
        }
        summary
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_generating() -> StateMachine {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::Outline, None).unwrap();
        sm.advance(LoopState::Generating, None).unwrap();
        sm.set_attempt(1);
        sm
    }

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), LoopState::Init);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_happy_path() {
        let mut sm = at_generating();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.advance(LoopState::Rendering, Some("syntax valid")).unwrap();
        sm.advance(LoopState::Success, Some("video present")).unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 5);
    }

    #[test]
    fn test_syntax_retry_skips_rendering() {
        let mut sm = at_generating();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.advance(LoopState::Generating, Some("syntax error")).unwrap();
        sm.set_attempt(2);
        sm.advance(LoopState::Validating, None).unwrap();
        assert_eq!(sm.transitions()[3].reason.as_deref(), Some("syntax error"));
        assert_eq!(sm.transitions()[4].attempt, 2);
    }

    #[test]
    fn test_render_retry() {
        let mut sm = at_generating();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.advance(LoopState::Rendering, None).unwrap();
        sm.advance(LoopState::Generating, Some("empty scene")).unwrap();
        assert_eq!(sm.current(), LoopState::Generating);
    }

    #[test]
    fn test_generation_failure_retries_in_place() {
        let mut sm = at_generating();
        sm.advance(LoopState::Generating, Some("upstream error")).unwrap();
        assert_eq!(sm.current(), LoopState::Generating);
    }

    #[test]
    fn test_failure_from_any_nonterminal_state() {
        for state in [
            LoopState::Init,
            LoopState::Outline,
            LoopState::Generating,
            LoopState::Validating,
            LoopState::Rendering,
        ] {
            let mut sm = StateMachine {
                current: state,
                attempt: 0,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.fail("test failure").is_ok());
            assert_eq!(sm.current(), LoopState::Failed);
        }
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut sm = at_generating();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.advance(LoopState::Rendering, None).unwrap();
        sm.advance(LoopState::Success, None).unwrap();

        let err = sm.advance(LoopState::Generating, None).unwrap_err();
        assert_eq!(err.from, LoopState::Success);
        assert!(sm.fail("nope").is_err());
    }

    #[test]
    fn test_cannot_render_without_validation() {
        let mut sm = at_generating();
        let err = sm.advance(LoopState::Rendering, None).unwrap_err();
        assert_eq!(err.from, LoopState::Generating);
        assert_eq!(err.to, LoopState::Rendering);
    }

    #[test]
    fn test_outline_is_not_reentered() {
        let mut sm = at_generating();
        assert!(sm.advance(LoopState::Outline, None).is_err());
    }

    #[test]
    fn test_summary() {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::Outline, None).unwrap();
        sm.fail("outline error").unwrap();
        let summary = sm.summary();
        assert!(summary.starts_with("Init → Failed after 0 attempt(s)"));
        assert!(summary.ends_with("[Outline → Failed]"));
    }
}
