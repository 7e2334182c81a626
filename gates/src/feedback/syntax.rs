//! Python syntax validation backed by tree-sitter.
//!
//! Generated scripts come from an untrusted source, so they are only ever
//! parsed, never imported or executed. tree-sitter recovers from errors and
//! marks the damage with `ERROR` and `MISSING` nodes; the first such node is
//! reported with its 1-based location.

use std::fmt;

use serde::{Deserialize, Serialize};
use tree_sitter::{Language, LanguageError, Node, Parser};

/// Longest snippet of offending source quoted in a message.
const MAX_SNIPPET_CHARS: usize = 60;

/// Kind of syntax problem found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxIssueKind {
    /// Source contained nothing to parse
    Empty,
    /// Tokens the grammar could not place
    InvalidSyntax,
    /// A required token (closing bracket, colon, ...) is absent
    MissingToken,
    /// The parser gave up without producing a tree
    Unparsable,
}

impl fmt::Display for SyntaxIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty_source"),
            Self::InvalidSyntax => write!(f, "invalid_syntax"),
            Self::MissingToken => write!(f, "missing_token"),
            Self::Unparsable => write!(f, "unparsable"),
        }
    }
}

/// A structured syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    pub kind: SyntaxIssueKind,
    pub message: String,
    /// 1-based line, when the parser could locate the problem
    pub line: Option<usize>,
    /// 1-based column, when the parser could locate the problem
    pub column: Option<usize>,
}

impl SyntaxIssue {
    fn unlocated(kind: SyntaxIssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Render the issue as feedback for the next generation attempt.
    pub fn format_for_feedback(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError ({}): {}", self.kind, self.message)?;
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, " at line {}, column {}", line, column)?;
        }
        Ok(())
    }
}

/// Outcome of validating a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxVerdict {
    Valid,
    Invalid(SyntaxIssue),
}

impl SyntaxVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Structural validator for Python source.
#[derive(Clone)]
pub struct SyntaxValidator {
    language: Language,
}

impl SyntaxValidator {
    /// Create a validator, checking the grammar is ABI-compatible with the
    /// linked tree-sitter runtime.
    pub fn new() -> Result<Self, LanguageError> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        Parser::new().set_language(&language)?;
        Ok(Self { language })
    }

    /// Parse `source` and report the first syntax problem, if any.
    pub fn validate(&self, source: &str) -> SyntaxVerdict {
        if source.trim().is_empty() {
            return SyntaxVerdict::Invalid(SyntaxIssue::unlocated(
                SyntaxIssueKind::Empty,
                "the generated script is empty",
            ));
        }

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&self.language) {
            return SyntaxVerdict::Invalid(SyntaxIssue::unlocated(
                SyntaxIssueKind::Unparsable,
                format!("python grammar unavailable: {}", e),
            ));
        }

        let tree = match parser.parse(source, None) {
            Some(tree) => tree,
            None => {
                return SyntaxVerdict::Invalid(SyntaxIssue::unlocated(
                    SyntaxIssueKind::Unparsable,
                    "parser produced no syntax tree",
                ))
            }
        };

        let root = tree.root_node();
        if !root.has_error() {
            tracing::debug!(bytes = source.len(), "Script syntax is valid");
            return SyntaxVerdict::Valid;
        }

        let issue = match first_problem(root) {
            Some(node) => describe(node, source),
            None => SyntaxIssue::unlocated(
                SyntaxIssueKind::InvalidSyntax,
                "the script contains a syntax error",
            ),
        };

        tracing::debug!(issue = %issue, "Script failed syntax validation");
        SyntaxVerdict::Invalid(issue)
    }
}

/// Depth-first search for the first `ERROR` or `MISSING` node.
fn first_problem(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find_map(first_problem)
}

fn describe(node: Node<'_>, source: &str) -> SyntaxIssue {
    let position = node.start_position();

    let (kind, message) = if node.is_missing() {
        (
            SyntaxIssueKind::MissingToken,
            format!("expected `{}`", node.kind()),
        )
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or("");
        let snippet: String = text
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .chars()
            .take(MAX_SNIPPET_CHARS)
            .collect();
        let message = if snippet.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near `{}`", snippet)
        };
        (SyntaxIssueKind::InvalidSyntax, message)
    };

    SyntaxIssue {
        kind,
        message,
        line: Some(position.row + 1),
        column: Some(position.column + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SCENE: &str = r#"from manim import *


class GeneratedScene(Scene):
    def construct(self):
        title = Text("Binary Search", color=BLUE)
        self.play(Write(title))
        self.wait(1)
        self.play(FadeOut(*self.mobjects))
"#;

    fn validator() -> SyntaxValidator {
        SyntaxValidator::new().unwrap()
    }

    #[test]
    fn test_grammar_loads() {
        assert!(SyntaxValidator::new().is_ok());
    }

    #[test]
    fn test_valid_scene() {
        assert_eq!(validator().validate(VALID_SCENE), SyntaxVerdict::Valid);
    }

    #[test]
    fn test_empty_source() {
        match validator().validate("   \n") {
            SyntaxVerdict::Invalid(issue) => assert_eq!(issue.kind, SyntaxIssueKind::Empty),
            SyntaxVerdict::Valid => panic!("empty source must be invalid"),
        }
    }

    #[test]
    fn test_broken_def_reports_location() {
        let source = "x = 1\ndef broken(:\n    pass\n";
        match validator().validate(source) {
            SyntaxVerdict::Invalid(issue) => {
                assert!(issue.line.is_some());
                assert!(issue.column.is_some());
                assert!(issue.to_string().starts_with("SyntaxError"));
            }
            SyntaxVerdict::Valid => panic!("broken def must be invalid"),
        }
    }

    #[test]
    fn test_unclosed_call() {
        let source = "from manim import *\nself.play(Create(Circle())\n";
        assert!(!validator().validate(source).is_valid());
    }

    #[test]
    fn test_fence_left_in_source_is_invalid() {
        let source = "```python\nx = 1\n```";
        assert!(!validator().validate(source).is_valid());
    }

    #[test]
    fn test_feedback_format_includes_location() {
        let issue = SyntaxIssue {
            kind: SyntaxIssueKind::MissingToken,
            message: "expected `)`".to_string(),
            line: Some(4),
            column: Some(12),
        };
        assert_eq!(
            issue.format_for_feedback(),
            "SyntaxError (missing_token): expected `)` at line 4, column 12"
        );
    }
}
