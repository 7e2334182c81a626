//! Scene coder agent: (outline, topic, feedback) → Manim script source.

use gates::extract_source;

use crate::agents::TextGenerator;
use crate::errors::GenerationError;
use crate::prompts;

pub struct SceneCoder<G> {
    generator: G,
    scene_class: String,
}

impl<G: TextGenerator> SceneCoder<G> {
    pub fn new(generator: G, scene_class: &str) -> Self {
        Self {
            generator,
            scene_class: scene_class.to_string(),
        }
    }

    pub fn scene_class(&self) -> &str {
        &self.scene_class
    }

    /// Generate a script, with fences stripped.
    ///
    /// `feedback` describes the previous attempt's failure and turns the
    /// request into a correction.
    pub async fn generate(
        &self,
        outline: &str,
        topic: &str,
        feedback: Option<&str>,
    ) -> Result<String, GenerationError> {
        let prompt = prompts::scene_prompt(topic, outline, &self.scene_class, feedback);
        let response = self.generator.generate(&prompt).await?;

        let source = extract_source(&response, prompts::SOURCE_FENCE_LABEL);
        if source.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        tracing::info!(
            lines = source.lines().count(),
            correction = feedback.is_some(),
            "Scene script generated"
        );
        Ok(source)
    }
}
