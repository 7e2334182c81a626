//! Agent builders for the outline, scene and chat roles.
//!
//! Every role talks to the text service through [`TextGenerator`], so the
//! loop controller can be driven by scripted generators in tests. The
//! production implementation wraps a rig agent built from an
//! OpenAI-compatible endpoint.

pub mod coder;
pub mod outliner;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::config::SceneConfig;
use crate::errors::GenerationError;
use crate::prompts;

pub use coder::SceneCoder;
pub use outliner::OutlineGenerator;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// A prompt-in, text-out generation service.
///
/// Implementations must re-signal every lower-level failure as
/// [`GenerationError`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// [`TextGenerator`] backed by a rig agent.
pub struct RigTextGenerator {
    agent: OaiAgent,
    model: String,
}

impl RigTextGenerator {
    pub fn new(
        client: &openai::CompletionsClient,
        model: &str,
        preamble: &str,
        temperature: f64,
    ) -> Self {
        let agent = client
            .agent(model)
            .preamble(preamble)
            .temperature(temperature)
            .build();
        Self {
            agent,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for RigTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let response: String = self.agent.prompt(prompt).await.map_err(|e| {
            tracing::warn!(model = %self.model, "Text generation failed: {e}");
            GenerationError::Upstream(e.to_string())
        })?;
        Ok(response)
    }
}

/// Builds the role-specific generators from one shared client.
pub struct AgentFactory {
    client: openai::CompletionsClient,
    config: SceneConfig,
}

impl AgentFactory {
    pub fn new(config: &SceneConfig) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&config.base_url)
            .build()
            .context("Failed to build text-generation client")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn build_outliner(&self) -> OutlineGenerator<RigTextGenerator> {
        OutlineGenerator::new(RigTextGenerator::new(
            &self.client,
            &self.config.outline_model,
            prompts::OUTLINE_PREAMBLE,
            self.config.temperature,
        ))
    }

    pub fn build_scene_coder(&self) -> SceneCoder<RigTextGenerator> {
        SceneCoder::new(
            RigTextGenerator::new(
                &self.client,
                &self.config.code_model,
                prompts::SCENE_CODER_PREAMBLE,
                // Code runs at half the outline temperature, capped at 0.3
                (self.config.temperature * 0.5).min(0.3),
            ),
            &self.config.scene_class,
        )
    }

    pub fn build_chat(&self) -> RigTextGenerator {
        RigTextGenerator::new(
            &self.client,
            &self.config.chat_model,
            prompts::CHAT_PREAMBLE,
            self.config.temperature,
        )
    }
}
