//! External renderer wrapper with captured output and a hard timeout
//!
//! Runs the animation renderer (Manim by default) as a subprocess. A nonzero
//! exit code is data, not an error: the caller inspects `RenderOutput` and
//! decides whether the attempt failed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default renderer timeout.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Paths handed to the renderer for one attempt.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Script to render
    pub script: PathBuf,
    /// Where the video must end up
    pub output: PathBuf,
    /// Scratch directory for the renderer's intermediate files
    pub media_dir: PathBuf,
}

/// Captured result of a render subprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderOutput {
    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,
    /// Raw stdout
    pub stdout: String,
    /// Raw stderr
    pub stderr: String,
    /// Whether the process was killed for exceeding the timeout
    pub timed_out: bool,
    /// Wall-clock duration
    pub duration_ms: u64,
}

impl RenderOutput {
    /// Whether the process exited cleanly. Callers must still check the
    /// output file exists.
    pub fn exited_cleanly(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Failure to run the renderer at all.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for renderer `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can turn a script into a video.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}

/// Renderer backed by an external command line.
///
/// Arguments are a template; `{script}`, `{output}`, `{scene}` and
/// `{media_dir}` are substituted per request.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    scene_class: String,
    timeout: Duration,
}

impl CommandRenderer {
    /// Create a renderer for an arbitrary command.
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        scene_class: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            scene_class: scene_class.into(),
            timeout,
        }
    }

    /// `python3 -m manim -qm --media_dir <media> <script> <Scene> -o <output>`
    pub fn manim(scene_class: impl Into<String>, timeout: Duration) -> Self {
        Self::new("python3", Self::manim_args(), scene_class, timeout)
    }

    /// Default Manim argument template.
    pub fn manim_args() -> Vec<String> {
        [
            "-m",
            "manim",
            "-qm",
            "--media_dir",
            "{media_dir}",
            "{script}",
            "{scene}",
            "-o",
            "{output}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Substitute request paths into the argument template.
    pub fn expand_args(&self, request: &RenderRequest) -> Vec<String> {
        let script = request.script.to_string_lossy();
        let output = request.output.to_string_lossy();
        let media_dir = request.media_dir.to_string_lossy();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{script}", &script)
                    .replace("{output}", &output)
                    .replace("{media_dir}", &media_dir)
                    .replace("{scene}", &self.scene_class)
            })
            .collect()
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let args = self.expand_args(request);
        tracing::info!(
            program = %self.program,
            script = %request.script.display(),
            output = %request.output.display(),
            "Starting render"
        );

        let start = Instant::now();
        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = RenderOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                if result.exited_cleanly() {
                    tracing::info!(duration_ms = result.duration_ms, "Render finished");
                } else {
                    tracing::warn!(
                        exit_code = ?result.exit_code,
                        stderr_bytes = result.stderr.len(),
                        "Render exited with failure"
                    );
                }
                Ok(result)
            }
            Ok(Err(source)) => Err(RenderError::Wait {
                program: self.program.clone(),
                source,
            }),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Render timed out, process killed"
                );
                Ok(RenderOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!(
                        "render timed out after {:.1}s",
                        self.timeout.as_secs_f64()
                    ),
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> RenderRequest {
        RenderRequest {
            script: dir.join("scene.py"),
            output: dir.join("video.mp4"),
            media_dir: dir.join("media"),
        }
    }

    #[test]
    fn test_manim_args_expanded() {
        let renderer = CommandRenderer::manim("GeneratedScene", DEFAULT_RENDER_TIMEOUT);
        let req = RenderRequest {
            script: PathBuf::from("/out/scene_1.py"),
            output: PathBuf::from("/out/video_1.mp4"),
            media_dir: PathBuf::from("/out/media"),
        };
        let args = renderer.expand_args(&req);
        assert_eq!(
            args,
            vec![
                "-m",
                "manim",
                "-qm",
                "--media_dir",
                "/out/media",
                "/out/scene_1.py",
                "GeneratedScene",
                "-o",
                "/out/video_1.mp4"
            ]
        );
        assert_eq!(renderer.program(), "python3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_command_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(
            "sh",
            vec![
                "-c".into(),
                "printf rendered > \"$1\"".into(),
                "sh".into(),
                "{output}".into(),
            ],
            "GeneratedScene",
            Duration::from_secs(10),
        );
        let req = request(dir.path());

        let output = renderer.render(&req).await.unwrap();
        assert!(output.exited_cleanly());
        assert_eq!(std::fs::read_to_string(&req.output).unwrap(), "rendered");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
            "GeneratedScene",
            Duration::from_secs(10),
        );

        let output = renderer.render(&request(dir.path())).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stderr.contains("boom"));
        assert!(!output.exited_cleanly());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            "GeneratedScene",
            Duration::from_millis(100),
        );

        let output = renderer.render(&request(dir.path())).await.unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(output.duration_ms < 5000);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(
            "definitely-not-a-renderer-3f9a",
            vec![],
            "GeneratedScene",
            Duration::from_secs(1),
        );

        let err = renderer.render(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
    }
}
