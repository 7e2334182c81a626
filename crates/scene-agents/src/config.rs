use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Gemini's OpenAI-compatible endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OUTPUT_DIR: &str = "output_videos";
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SCENE_CLASS: &str = "GeneratedScene";

/// Top-level configuration, loaded once at process start and injected into
/// the generators, renderer and loop controller.
///
/// Precedence (highest to lowest): `SCENE_*` environment variables, the TOML
/// file passed to [`SceneConfig::load`], built-in defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// OpenAI-compatible base URL of the text-generation service
    pub base_url: String,
    /// API key; only required when a client is built
    pub api_key: Option<String>,
    /// Model used for outlines
    pub outline_model: String,
    /// Model used for scene code
    pub code_model: String,
    /// Model used for chatbot queries
    pub chat_model: String,
    pub temperature: f64,
    /// Directory holding scratch scripts and rendered videos
    pub output_dir: PathBuf,
    /// Attempt budget per run
    pub max_attempts: u32,
    pub render_timeout_secs: u64,
    /// Fixed pause between attempts
    pub retry_delay_ms: u64,
    /// Scratch scripts from failed attempts kept for postmortem
    pub retain_failed_scripts: usize,
    /// Renderer executable
    pub render_program: String,
    /// Renderer argument template (None = Manim defaults)
    pub render_args: Option<Vec<String>>,
    /// Name of the Scene subclass the model must define
    pub scene_class: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            outline_model: DEFAULT_MODEL.into(),
            code_model: DEFAULT_MODEL.into(),
            chat_model: DEFAULT_MODEL.into(),
            temperature: 0.4,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            retry_delay_ms: 0,
            retain_failed_scripts: 1,
            render_program: "python3".into(),
            render_args: None,
            scene_class: DEFAULT_SCENE_CLASS.into(),
        }
    }
}

impl SceneConfig {
    /// Load configuration: defaults, then the optional TOML file, then the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid scene config TOML")
    }

    /// Apply `SCENE_*` overrides. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("SCENE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("SCENE_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("SCENE_OUTLINE_MODEL") {
            self.outline_model = v;
        }
        if let Some(v) = lookup("SCENE_CODE_MODEL") {
            self.code_model = v;
        }
        if let Some(v) = lookup("SCENE_CHAT_MODEL") {
            self.chat_model = v;
        }
        if let Some(v) = lookup("SCENE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCENE_MAX_ATTEMPTS") {
            self.max_attempts = v
                .parse()
                .with_context(|| format!("SCENE_MAX_ATTEMPTS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("SCENE_RENDER_TIMEOUT_SECS") {
            self.render_timeout_secs = v
                .parse()
                .with_context(|| format!("SCENE_RENDER_TIMEOUT_SECS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("SCENE_RENDER_PROGRAM") {
            self.render_program = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.render_timeout_secs == 0 {
            bail!("render_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// API key, or an error naming the variables that provide it.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!("No API key configured. Set SCENE_API_KEY or GEMINI_API_KEY."),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Check if the text endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str, api_key: Option<&str>) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    let mut request = reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5));
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
