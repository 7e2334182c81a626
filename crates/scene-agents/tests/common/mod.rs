//! Scripted doubles for the text service and the renderer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gates::{RenderError, RenderOutput, RenderRequest, Renderer};
use scene_agents::agents::{OutlineGenerator, SceneCoder, TextGenerator};
use scene_agents::{GenerationError, LoopSettings, RenderLoop};

pub const VALID_SCRIPT: &str = "from manim import *\n\n\
class GeneratedScene(Scene):\n    \
def construct(self):\n        \
circle = Circle()\n        \
self.play(Create(circle))\n        \
self.wait(1)\n";

pub const BROKEN_SCRIPT: &str = "from manim import *\n\n\
class GeneratedScene(Scene):\n    \
def construct(self:\n        \
self.wait(1)\n";

pub const EMPTY_SCENE_STDERR: &str = "Traceback (most recent call last):\n  \
File \"scene.py\", line 5, in construct\n    \
self.play(FadeOut(*self.mobjects))\n\
ValueError: At least one mobject must be passed.\n";

pub fn fenced(source: &str) -> String {
    format!("Here is the script:\n```python\n{source}```\n")
}

#[derive(Default)]
struct GeneratorState {
    responses: VecDeque<Result<String, GenerationError>>,
    prompts: Vec<String>,
}

/// Text service that replays queued responses and records every prompt.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    state: Arc<Mutex<GeneratorState>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GeneratorState {
                responses: responses.into(),
                prompts: Vec::new(),
            })),
        }
    }

    pub fn repeating(response: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(response.to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().prompts.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().prompts.len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut state = self.state.lock().unwrap();
        state.prompts.push(prompt.to_string());
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Upstream("no scripted response left".into())))
    }
}

/// What the scripted renderer does on one call.
#[derive(Debug, Clone)]
pub enum RenderStep {
    /// Exit 0 and write the output file
    Succeed,
    /// Exit 0 without writing anything
    SucceedWithoutFile,
    Fail { exit_code: i32, stderr: String },
    Timeout,
    LaunchFailure,
}

#[derive(Default)]
struct RendererState {
    steps: VecDeque<RenderStep>,
    requests: Vec<RenderRequest>,
}

#[derive(Clone, Default)]
pub struct ScriptedRenderer {
    state: Arc<Mutex<RendererState>>,
}

impl ScriptedRenderer {
    pub fn new(steps: Vec<RenderStep>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RendererState {
                steps: steps.into(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let step = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state.steps.pop_front().unwrap_or(RenderStep::Fail {
                exit_code: 1,
                stderr: "no scripted render step left".into(),
            })
        };

        let output = match step {
            RenderStep::Succeed => {
                assert!(request.script.exists(), "script must be on disk before render");
                std::fs::write(&request.output, b"fake mp4").unwrap();
                RenderOutput {
                    exit_code: Some(0),
                    ..RenderOutput::default()
                }
            }
            RenderStep::SucceedWithoutFile => RenderOutput {
                exit_code: Some(0),
                ..RenderOutput::default()
            },
            RenderStep::Fail { exit_code, stderr } => RenderOutput {
                exit_code: Some(exit_code),
                stderr,
                ..RenderOutput::default()
            },
            RenderStep::Timeout => RenderOutput {
                timed_out: true,
                stderr: "render timed out after 300s".into(),
                ..RenderOutput::default()
            },
            RenderStep::LaunchFailure => {
                return Err(RenderError::Spawn {
                    program: "manim".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
                })
            }
        };
        Ok(output)
    }
}

pub fn settings(output_dir: &Path, max_attempts: u32) -> LoopSettings {
    LoopSettings {
        output_dir: output_dir.to_path_buf(),
        max_attempts,
        retry_delay: Duration::ZERO,
        retain_failed_scripts: 1,
    }
}

pub fn build_loop(
    outline: &ScriptedGenerator,
    coder: &ScriptedGenerator,
    renderer: &ScriptedRenderer,
    settings: LoopSettings,
) -> RenderLoop<ScriptedGenerator, ScriptedRenderer> {
    RenderLoop::new(
        OutlineGenerator::new(outline.clone()),
        SceneCoder::new(coder.clone(), "GeneratedScene"),
        renderer.clone(),
        settings,
    )
    .unwrap()
}

/// Files in `dir` whose name ends with `suffix`.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect()
}
