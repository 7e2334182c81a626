//! Scene Gates Library
//!
//! Deterministic, model-free checks that sit between a text-generation
//! service and an external animation renderer:
//! - Locate the source block inside a model response
//! - Parse Python source structurally (no execution)
//! - Run the renderer as a bounded subprocess
//! - Classify render failures into actionable feedback
//!
//! # Architecture
//!
//! ```text
//! Response → extract_source → SyntaxValidator → Renderer → RenderErrorClassifier
//!                                   │                              │
//!                                   └──────── feedback ────────────┘
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod feedback;

pub use feedback::{
    extract_source, ClassifiedFailure, CommandRenderer, FailureCategory, FeedbackRule,
    RenderError, RenderErrorClassifier, RenderOutput, RenderRequest, Renderer, SyntaxIssue,
    SyntaxIssueKind, SyntaxValidator, SyntaxVerdict,
};
