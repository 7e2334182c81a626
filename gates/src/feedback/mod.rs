//! Render Feedback Module
//!
//! Provides the deterministic half of the generate/validate/render loop:
//! - Strip fences from a model response to obtain source text
//! - Validate Python syntax with tree-sitter, never executing the script
//! - Render the script with an external command and capture its output
//! - Classify renderer stderr into feedback for the next generation attempt
//!
//! # Architecture
//!
//! ```text
//! Source → SyntaxValidator ──invalid──→ SyntaxIssue ─────────────┐
//!              │ valid                                            ↓
//!              └──→ Renderer → RenderOutput → Classifier → feedback text
//! ```

pub mod error_parser;
pub mod fence;
pub mod renderer;
pub mod syntax;

pub use error_parser::{ClassifiedFailure, FailureCategory, FeedbackRule, RenderErrorClassifier};
pub use fence::extract_source;
pub use renderer::{CommandRenderer, RenderError, RenderOutput, RenderRequest, Renderer};
pub use syntax::{SyntaxIssue, SyntaxIssueKind, SyntaxValidator, SyntaxVerdict};
