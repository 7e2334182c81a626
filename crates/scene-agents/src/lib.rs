//! Scene Agents
//!
//! Turns a topic into an explanatory animation: one outline, then a bounded
//! generate → validate → render loop that feeds each failure back into the
//! next code-generation call.
//!
//! The deterministic pieces (fence extraction, syntax validation, render
//! subprocess, failure classification) live in the `gates` crate; this crate
//! owns configuration, prompts, text-generation clients, the loop controller
//! and the request handlers.

pub mod agents;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod prompts;
pub mod service;
pub mod state_machine;
pub mod telemetry;

pub use config::SceneConfig;
pub use errors::{AttemptFailure, GenerationError, RunError};
pub use orchestrator::{Artifact, LoopSettings, RenderLoop, RunId};
