//! Render failure classification
//!
//! Maps renderer stderr to categories with human-actionable feedback that is
//! fed into the next generation attempt. The mapping is an ordered table of
//! regex predicates; the first matching rule wins and unmatched failures fall
//! back to a generic message carrying the exit code and stderr.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::feedback::renderer::{RenderError, RenderOutput};

/// Maximum characters of raw stderr embedded in generic feedback.
const MAX_STDERR_FEEDBACK_CHARS: usize = 3000;

static EMPTY_SCENE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"At least one mobject must be passed").unwrap());

static MISSING_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FileNotFoundError").unwrap());

static UNDEFINED_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NameError").unwrap());

static LATEX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(latex error converting|latex compilation error|\blatex\b.*not found)")
        .unwrap()
});

static ATTRIBUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AttributeError").unwrap());

/// Why a render attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// A clearing transition ran before anything was on screen
    EmptySceneTransition,
    /// Renderer could not find the output directory or file path
    MissingOutputPath,
    /// Script referenced a name it never defined or imported
    UndefinedName,
    /// LaTeX toolchain failed on a Tex/MathTex object
    LatexFailure,
    /// Script used an attribute or method the renderer lacks
    AttributeError,
    /// Renderer exceeded the time limit and was killed
    Timeout,
    /// Renderer exited cleanly but no video was written
    OutputMissing,
    /// Renderer process could not be started
    LaunchFailure,
    /// Caller-supplied rule
    Custom(String),
    /// Nothing matched
    Other,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySceneTransition => write!(f, "empty_scene_transition"),
            Self::MissingOutputPath => write!(f, "missing_output_path"),
            Self::UndefinedName => write!(f, "undefined_name"),
            Self::LatexFailure => write!(f, "latex_failure"),
            Self::AttributeError => write!(f, "attribute_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::OutputMissing => write!(f, "output_missing"),
            Self::LaunchFailure => write!(f, "launch_failure"),
            Self::Custom(name) => write!(f, "{}", name),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct FeedbackRule {
    pub category: FailureCategory,
    pub pattern: Regex,
    pub feedback: String,
}

impl FeedbackRule {
    pub fn new(category: FailureCategory, pattern: Regex, feedback: impl Into<String>) -> Self {
        Self {
            category,
            pattern,
            feedback: feedback.into(),
        }
    }

    /// First stderr line matching this rule, if any.
    fn matching_line<'a>(&self, stderr: &'a str) -> Option<&'a str> {
        stderr
            .lines()
            .find(|line| self.pattern.is_match(line))
            .map(str::trim)
    }
}

/// A classified render failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    pub category: FailureCategory,
    /// Feedback for the next generation attempt (never empty)
    pub feedback: String,
    pub exit_code: Option<i32>,
}

/// Ordered predicate → feedback table.
#[derive(Debug, Clone)]
pub struct RenderErrorClassifier {
    rules: Vec<FeedbackRule>,
}

impl Default for RenderErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderErrorClassifier {
    /// Classifier with the built-in rules.
    pub fn new() -> Self {
        Self {
            rules: Self::builtin_rules(),
        }
    }

    /// Classifier with no rules; every failure gets generic feedback.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. Rules are evaluated in insertion order.
    pub fn with_rule(mut self, rule: FeedbackRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FeedbackRule] {
        &self.rules
    }

    fn builtin_rules() -> Vec<FeedbackRule> {
        vec![
            FeedbackRule::new(
                FailureCategory::EmptySceneTransition,
                EMPTY_SCENE_PATTERN.clone(),
                "Error: the scene tried to fade out mobjects while it was still empty. \
                 Remove the initial clearing animation (FadeOut(*self.mobjects) at the start \
                 of construct) and only clear the scene after objects have been added.",
            ),
            FeedbackRule::new(
                FailureCategory::MissingOutputPath,
                MISSING_PATH_PATTERN.clone(),
                "Error: the renderer could not find the output directory or file path. \
                 Do not read or write files from the script and do not change the output location.",
            ),
            FeedbackRule::new(
                FailureCategory::UndefinedName,
                UNDEFINED_NAME_PATTERN.clone(),
                "Error: the script used a name that was never defined or imported. \
                 Define every variable and helper before use and keep `from manim import *`.",
            ),
            FeedbackRule::new(
                FailureCategory::LatexFailure,
                LATEX_PATTERN.clone(),
                "Error: LaTeX rendering failed. Replace Tex and MathTex objects with Text \
                 and write formulas as plain text (for example O(log n)).",
            ),
            FeedbackRule::new(
                FailureCategory::AttributeError,
                ATTRIBUTE_PATTERN.clone(),
                "Error: the script called a method or attribute that does not exist in the \
                 installed Manim version. Use only documented Manim Community APIs.",
            ),
        ]
    }

    /// Classify a finished render.
    ///
    /// Returns `None` when the render succeeded: clean exit AND the output
    /// file exists.
    pub fn classify(&self, output: &RenderOutput, output_exists: bool) -> Option<ClassifiedFailure> {
        if output.exited_cleanly() && output_exists {
            return None;
        }

        if output.timed_out {
            return Some(ClassifiedFailure {
                category: FailureCategory::Timeout,
                feedback: format!(
                    "Error: {}. Simplify the animation: use fewer objects, shorter run_time \
                     values and fewer self.wait calls.",
                    output.stderr.trim()
                ),
                exit_code: None,
            });
        }

        if let Some(failure) = self.match_rules(output) {
            return Some(failure);
        }

        if output.exited_cleanly() {
            return Some(ClassifiedFailure {
                category: FailureCategory::OutputMissing,
                feedback: "Error: the renderer exited successfully but no video file was \
                           produced. Define exactly one Scene subclass with the requested name \
                           and play at least one animation in construct."
                    .to_string(),
                exit_code: output.exit_code,
            });
        }

        Some(ClassifiedFailure {
            category: FailureCategory::Other,
            feedback: format!(
                "Render failed with exit code {}\nErrors:\n{}",
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                tail(output.stderr.trim(), MAX_STDERR_FEEDBACK_CHARS)
            ),
            exit_code: output.exit_code,
        })
    }

    /// Classify a renderer that never started.
    pub fn classify_launch_failure(&self, err: &RenderError) -> ClassifiedFailure {
        ClassifiedFailure {
            category: FailureCategory::LaunchFailure,
            feedback: format!("Error: the renderer could not be run: {}", err),
            exit_code: None,
        }
    }

    fn match_rules(&self, output: &RenderOutput) -> Option<ClassifiedFailure> {
        self.rules.iter().find_map(|rule| {
            rule.matching_line(&output.stderr).map(|line| ClassifiedFailure {
                category: rule.category.clone(),
                feedback: format!("{}\nRenderer reported: {}", rule.feedback, line),
                exit_code: output.exit_code,
            })
        })
    }
}

/// Last `max_chars` characters of `text`, on a char boundary.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> RenderOutput {
        RenderOutput {
            exit_code: Some(1),
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_success_is_not_classified() {
        let output = RenderOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(RenderErrorClassifier::new().classify(&output, true).is_none());
    }

    #[test]
    fn test_empty_scene_transition() {
        let stderr = "Traceback (most recent call last):\n  ...\nValueError: At least one mobject must be passed.";
        let failure = RenderErrorClassifier::new()
            .classify(&failed(stderr), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::EmptySceneTransition);
        assert!(failure.feedback.contains("Remove the initial clearing animation"));
        assert!(failure.feedback.contains("At least one mobject"));
    }

    #[test]
    fn test_missing_output_path() {
        let failure = RenderErrorClassifier::new()
            .classify(&failed("FileNotFoundError: [Errno 2] No such file"), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::MissingOutputPath);
    }

    #[test]
    fn test_undefined_name() {
        let failure = RenderErrorClassifier::new()
            .classify(&failed("NameError: name 'arrow' is not defined"), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::UndefinedName);
        assert!(failure.feedback.contains("name 'arrow' is not defined"));
    }

    #[test]
    fn test_first_rule_wins() {
        let stderr = "ValueError: At least one mobject must be passed\nFileNotFoundError: x";
        let failure = RenderErrorClassifier::new()
            .classify(&failed(stderr), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::EmptySceneTransition);
    }

    #[test]
    fn test_unrecognized_falls_back_to_generic() {
        let failure = RenderErrorClassifier::new()
            .classify(
                &RenderOutput {
                    exit_code: Some(2),
                    stderr: "ZeroDivisionError: division by zero".to_string(),
                    ..Default::default()
                },
                false,
            )
            .unwrap();
        assert_eq!(failure.category, FailureCategory::Other);
        assert!(failure.feedback.contains("exit code 2"));
        assert!(failure.feedback.contains("ZeroDivisionError"));
    }

    #[test]
    fn test_clean_exit_without_file() {
        let output = RenderOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let failure = RenderErrorClassifier::new().classify(&output, false).unwrap();
        assert_eq!(failure.category, FailureCategory::OutputMissing);
        assert!(!failure.feedback.is_empty());
    }

    #[test]
    fn test_timeout() {
        let output = RenderOutput {
            timed_out: true,
            stderr: "render timed out after 300.0s".to_string(),
            ..Default::default()
        };
        let failure = RenderErrorClassifier::new().classify(&output, false).unwrap();
        assert_eq!(failure.category, FailureCategory::Timeout);
        assert!(failure.feedback.contains("timed out"));
    }

    #[test]
    fn test_custom_rule_extends_table() {
        let classifier = RenderErrorClassifier::new().with_rule(FeedbackRule::new(
            FailureCategory::Custom("index_error".to_string()),
            Regex::new(r"IndexError").unwrap(),
            "Error: a list index was out of range.",
        ));
        let failure = classifier
            .classify(&failed("IndexError: list index out of range"), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::Custom("index_error".into()));
        assert_eq!(failure.category.to_string(), "index_error");
    }

    #[test]
    fn test_empty_classifier_is_generic() {
        let failure = RenderErrorClassifier::empty()
            .classify(&failed("FileNotFoundError"), false)
            .unwrap();
        assert_eq!(failure.category, FailureCategory::Other);
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }
}
