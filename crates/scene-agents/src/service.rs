//! Transport-agnostic request handlers.
//!
//! Each handler takes plain request values and returns either a response body
//! or a [`ServiceFailure`] carrying an HTTP-style status. Route wiring is left
//! to whatever server embeds them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::agents::TextGenerator;
use crate::errors::{GenerationError, RunError};
use crate::orchestrator::RenderLoop;
use gates::Renderer;

/// Marker some clients put in front of the topic.
pub const TOPIC_PREFIX: &str = "@visual";

/// Extension of the only files `fetch_video` serves.
pub const VIDEO_EXTENSION: &str = ".mp4";

/// URL prefix under which videos are served.
pub const VIDEO_ROUTE: &str = "/videos";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResponse {
    pub video_url: String,
    pub logs: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Failed request, with the run log when one exists.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{detail}")]
pub struct ServiceFailure {
    pub status: u16,
    pub detail: String,
    pub logs: Vec<String>,
}

impl ServiceFailure {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: 400,
            detail: detail.into(),
            logs: Vec::new(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: 500,
            detail: detail.into(),
            logs: Vec::new(),
        }
    }
}

impl From<RunError> for ServiceFailure {
    fn from(err: RunError) -> Self {
        let status = if err.is_client_error() { 400 } else { 500 };
        let logs = err.log().map(|log| log.lines()).unwrap_or_default();
        Self {
            status,
            detail: err.to_string(),
            logs,
        }
    }
}

/// Remove a leading `@visual` marker and surrounding whitespace.
///
/// The marker only counts as a whole word: `@visualization` is left alone.
pub fn strip_topic_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix(TOPIC_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => trimmed,
    }
}

/// Run the loop for a topic and describe the produced video.
pub async fn generate_video<G, R>(
    render_loop: &RenderLoop<G, R>,
    request: &VideoRequest,
) -> Result<VideoResponse, ServiceFailure>
where
    G: TextGenerator,
    R: Renderer,
{
    let topic = strip_topic_prefix(&request.topic);
    info!(topic, "Video requested");

    let artifact = render_loop.run(topic).await.map_err(|e| {
        warn!(topic, "Video generation failed: {e}");
        ServiceFailure::from(e)
    })?;

    let logs = artifact.log.lines();
    let present = tokio::fs::try_exists(&artifact.video_path)
        .await
        .unwrap_or(false);
    let file_name = match artifact.file_name() {
        Some(name) if present => name.to_string(),
        _ => {
            return Err(ServiceFailure {
                status: 500,
                detail: format!(
                    "Video file not found at {}",
                    artifact.video_path.display()
                ),
                logs,
            })
        }
    };

    Ok(VideoResponse {
        video_url: format!("{VIDEO_ROUTE}/{file_name}"),
        logs,
        message: format!(
            "Video generated successfully after {} attempt(s)",
            artifact.attempts
        ),
    })
}

/// Read a video from the managed output directory.
///
/// Only plain `.mp4` file names are served; scripts and the telemetry log
/// stay private. `Ok(None)` means not found.
pub async fn fetch_video(
    output_dir: &Path,
    filename: &str,
) -> Result<Option<Vec<u8>>, ServiceFailure> {
    if filename.len() <= VIDEO_EXTENSION.len()
        || !filename.ends_with(VIDEO_EXTENSION)
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(ServiceFailure::bad_request(format!(
            "Invalid video file name '{filename}'"
        )));
    }

    let path = output_dir.join(filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ServiceFailure::internal(format!(
            "Failed to read {}: {e}",
            path.display()
        ))),
    }
}

/// Forward a chat query. Blank queries get no reply.
pub async fn answer_chat<G: TextGenerator + ?Sized>(
    generator: &G,
    query: &str,
) -> Result<Option<ChatResponse>, GenerationError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }
    let reply = generator.generate(query).await?;
    Ok(Some(ChatResponse {
        reply: reply.trim().to_string(),
    }))
}
