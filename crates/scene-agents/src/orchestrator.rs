//! Render loop: outline once, then generate → validate → render until a video
//! exists or the attempt budget runs out.
//!
//! Every failure inside the budget is converted into feedback for the next
//! code-generation call. The loop never returns a partial artifact: a run
//! ends with exactly one [`Artifact`] or one [`RunError`].

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use gates::{
    CommandRenderer, RenderErrorClassifier, RenderRequest, Renderer, SyntaxValidator,
    SyntaxVerdict,
};
use tracing::{info, warn};

use crate::agents::{AgentFactory, OutlineGenerator, RigTextGenerator, SceneCoder, TextGenerator};
use crate::config::SceneConfig;
use crate::errors::{AttemptFailure, RunError};
use crate::state_machine::{LoopState, StateMachine};
use crate::telemetry::{self, Phase, RunLog, RunRecord};

/// Subdirectory of the output directory handed to the renderer for its caches.
pub const MEDIA_SUBDIR: &str = "media";

/// Identifier embedded in every file a run writes.
///
/// `<YYYYmmdd_HHMMSS>_<8 hex>`: the random suffix keeps runs started in the
/// same second apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{stamp}_{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn script_name(&self, attempt: u32) -> String {
        format!("scene_{}_attempt{attempt}.py", self.0)
    }

    pub fn video_name(&self, attempt: u32) -> String {
        format!("video_{}_attempt{attempt}.mp4", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Successful outcome of a run.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub video_path: PathBuf,
    pub run_id: RunId,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
    pub log: RunLog,
}

impl Artifact {
    pub fn file_name(&self) -> Option<&str> {
        self.video_path.file_name().and_then(|n| n.to_str())
    }
}

/// Loop bounds and filesystem policy.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub output_dir: PathBuf,
    pub max_attempts: u32,
    /// Pause before every attempt after the first
    pub retry_delay: Duration,
    /// Failed scripts kept on disk; older ones are deleted as new failures arrive
    pub retain_failed_scripts: usize,
}

impl LoopSettings {
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            retain_failed_scripts: config.retain_failed_scripts,
        }
    }
}

/// Per-run mutable state. Owned by one `run` call.
struct RunContext {
    run_id: RunId,
    machine: StateMachine,
    log: RunLog,
    started: Instant,
    failure_categories: Vec<String>,
}

impl RunContext {
    fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), RunError> {
        self.machine
            .advance(to, reason)
            .map_err(|source| RunError::IllegalTransition {
                source,
                log: std::mem::take(&mut self.log),
            })
    }

    fn io_error(&mut self, context: String, source: std::io::Error) -> RunError {
        self.log.failed(self.machine.attempt(), Phase::Finish, format!("{context}: {source}"));
        let _ = self.machine.fail(&context);
        RunError::Io {
            context,
            source,
            log: std::mem::take(&mut self.log),
        }
    }
}

/// Drives one topic through the loop. Shareable across tasks; `run` takes
/// `&self` and keeps all per-run state on its own stack.
pub struct RenderLoop<G, R> {
    outliner: OutlineGenerator<G>,
    coder: SceneCoder<G>,
    validator: SyntaxValidator,
    renderer: R,
    classifier: RenderErrorClassifier,
    settings: LoopSettings,
}

impl RenderLoop<RigTextGenerator, CommandRenderer> {
    /// Production wiring: rig agents plus the configured render command.
    pub fn from_config(config: &SceneConfig) -> Result<Self> {
        let factory = AgentFactory::new(config)?;
        let args = config
            .render_args
            .clone()
            .unwrap_or_else(CommandRenderer::manim_args);
        let renderer = CommandRenderer::new(
            config.render_program.clone(),
            args,
            config.scene_class.clone(),
            config.render_timeout(),
        );
        Self::new(
            factory.build_outliner(),
            factory.build_scene_coder(),
            renderer,
            LoopSettings::from_config(config),
        )
    }
}

impl<G: TextGenerator, R: Renderer> RenderLoop<G, R> {
    pub fn new(
        outliner: OutlineGenerator<G>,
        coder: SceneCoder<G>,
        renderer: R,
        settings: LoopSettings,
    ) -> Result<Self> {
        let validator = SyntaxValidator::new().context("Failed to load the Python grammar")?;
        Ok(Self {
            outliner,
            coder,
            validator,
            renderer,
            classifier: RenderErrorClassifier::new(),
            settings,
        })
    }

    /// Replace the render-failure classifier.
    pub fn with_classifier(mut self, classifier: RenderErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Produce a video for `topic`.
    pub async fn run(&self, topic: &str) -> Result<Artifact, RunError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(RunError::InvalidTopic("topic is empty".into()));
        }

        let mut ctx = RunContext {
            run_id: RunId::generate(),
            machine: StateMachine::new(),
            log: RunLog::new(),
            started: Instant::now(),
            failure_categories: Vec::new(),
        };

        let result = self.drive(&mut ctx, topic).await;

        let (success, attempts) = match &result {
            Ok(artifact) => (true, artifact.attempts),
            Err(err) => (false, err.log().map(RunLog::attempts).unwrap_or(0)),
        };
        info!(run_id = %ctx.run_id, "{}", ctx.machine.summary());
        telemetry::append_run_record(
            &self.settings.output_dir,
            &RunRecord::new(
                ctx.run_id.as_str(),
                topic,
                success,
                attempts,
                ctx.started.elapsed().as_millis() as u64,
                ctx.failure_categories.clone(),
            ),
        );
        result
    }

    async fn drive(&self, ctx: &mut RunContext, topic: &str) -> Result<Artifact, RunError> {
        // The renderer resolves relative output names against its media dir
        let output_root = match std::path::absolute(&self.settings.output_dir) {
            Ok(dir) => dir,
            Err(source) => {
                return Err(ctx.io_error(
                    format!(
                        "Failed to resolve output directory {}",
                        self.settings.output_dir.display()
                    ),
                    source,
                ))
            }
        };
        let output_dir = output_root.as_path();
        let media_dir = output_dir.join(MEDIA_SUBDIR);
        if let Err(source) = tokio::fs::create_dir_all(&media_dir).await {
            return Err(ctx.io_error(
                format!("Failed to create output directory {}", output_dir.display()),
                source,
            ));
        }
        ctx.log.ok(
            0,
            Phase::Init,
            format!("run {} started for '{topic}'", ctx.run_id),
        );

        ctx.advance(LoopState::Outline, None)?;
        let outline = match self.outliner.outline(topic).await {
            Ok(outline) => {
                ctx.log.ok(
                    0,
                    Phase::Outline,
                    format!("outline generated ({} chars)", outline.len()),
                );
                outline
            }
            Err(source) => {
                ctx.log.failed(0, Phase::Outline, source.to_string());
                ctx.advance(LoopState::Failed, Some("outline generation failed"))?;
                ctx.log.failed(0, Phase::Finish, "run aborted before any attempt");
                return Err(RunError::Outline {
                    source,
                    log: std::mem::take(&mut ctx.log),
                });
            }
        };
        ctx.advance(LoopState::Generating, None)?;

        let max_attempts = self.settings.max_attempts;
        let mut feedback: Option<String> = None;
        let mut last_failure = String::new();
        let mut retained: VecDeque<PathBuf> = VecDeque::new();

        for attempt in 1..=max_attempts {
            ctx.machine.set_attempt(attempt);
            if attempt > 1 && !self.settings.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }

            let script = output_dir.join(ctx.run_id.script_name(attempt));
            let video = output_dir.join(ctx.run_id.video_name(attempt));

            let failure = match self
                .attempt(ctx, topic, &outline, feedback.as_deref(), &script, &video, &media_dir)
                .await?
            {
                Ok(()) => {
                    ctx.advance(LoopState::Success, Some("video present"))?;
                    remove_quietly(&script).await;
                    for path in retained.drain(..) {
                        remove_quietly(&path).await;
                    }
                    ctx.log.ok(
                        0,
                        Phase::Finish,
                        format!("video ready after {attempt} attempt(s)"),
                    );
                    return Ok(Artifact {
                        video_path: video,
                        run_id: ctx.run_id.clone(),
                        attempts: attempt,
                        log: std::mem::take(&mut ctx.log),
                    });
                }
                Err(failure) => failure,
            };

            let category = failure.category();
            ctx.failure_categories.push(category.clone());
            if tokio::fs::try_exists(&script).await.unwrap_or(false) {
                retained.push_back(script);
                while retained.len() > self.settings.retain_failed_scripts {
                    if let Some(old) = retained.pop_front() {
                        remove_quietly(&old).await;
                    }
                }
            }

            last_failure = failure.to_string();
            feedback = Some(failure.feedback());
            if attempt < max_attempts {
                ctx.advance(LoopState::Generating, Some(&category))?;
            }
        }

        ctx.advance(LoopState::Failed, Some("attempt budget exhausted"))?;
        ctx.log.failed(
            0,
            Phase::Finish,
            format!("no video after {max_attempts} attempts"),
        );
        Err(RunError::MaxAttemptsExceeded {
            attempts: max_attempts,
            last_failure,
            log: std::mem::take(&mut ctx.log),
            retained_scripts: retained.into_iter().collect(),
        })
    }

    /// One generate/validate/render pass. The outer `Err` is fatal to the run.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        ctx: &mut RunContext,
        topic: &str,
        outline: &str,
        feedback: Option<&str>,
        script: &Path,
        video: &Path,
        media_dir: &Path,
    ) -> Result<Result<(), AttemptFailure>, RunError> {
        let attempt = ctx.machine.attempt();

        let source = match self.coder.generate(outline, topic, feedback).await {
            Ok(source) => source,
            Err(e) => {
                ctx.log.failed(attempt, Phase::Generation, e.to_string());
                return Ok(Err(AttemptFailure::Generation(e)));
            }
        };
        ctx.log.ok(
            attempt,
            Phase::Generation,
            format!("script generated ({} lines)", source.lines().count()),
        );

        if let Err(source) = tokio::fs::write(script, &source).await {
            return Err(ctx.io_error(
                format!("Failed to write script {}", script.display()),
                source,
            ));
        }

        ctx.advance(LoopState::Validating, None)?;
        if let SyntaxVerdict::Invalid(issue) = self.validator.validate(&source) {
            ctx.log.failed(attempt, Phase::Validation, issue.to_string());
            return Ok(Err(AttemptFailure::Syntax(issue)));
        }
        ctx.log.ok(attempt, Phase::Validation, "syntax valid");

        ctx.advance(LoopState::Rendering, None)?;
        let request = RenderRequest {
            script: script.to_path_buf(),
            output: video.to_path_buf(),
            media_dir: media_dir.to_path_buf(),
        };
        let classified = match self.renderer.render(&request).await {
            Ok(output) => {
                let exists = tokio::fs::try_exists(video).await.unwrap_or(false);
                self.classifier.classify(&output, exists)
            }
            Err(e) => {
                warn!(attempt, "Renderer could not be launched: {e}");
                Some(self.classifier.classify_launch_failure(&e))
            }
        };

        match classified {
            None => {
                ctx.log.ok(
                    attempt,
                    Phase::Render,
                    format!("video written to {}", video.display()),
                );
                Ok(Ok(()))
            }
            Some(failure) => {
                ctx.log.failed(
                    attempt,
                    Phase::Render,
                    format!("{}: {}", failure.category, first_line(&failure.feedback)),
                );
                Ok(Err(AttemptFailure::Render(failure)))
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove scratch file: {e}");
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
