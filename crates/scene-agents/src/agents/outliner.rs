//! Outline agent: topic → structured outline, generated once per run.

use crate::agents::TextGenerator;
use crate::errors::GenerationError;
use crate::prompts;

pub struct OutlineGenerator<G> {
    generator: G,
}

impl<G: TextGenerator> OutlineGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Generate the outline for `topic`.
    ///
    /// Whitespace-only responses are reported as [`GenerationError::Empty`].
    pub async fn outline(&self, topic: &str) -> Result<String, GenerationError> {
        let response = self.generator.generate(&prompts::outline_prompt(topic)).await?;
        let outline = response.trim();
        if outline.is_empty() {
            return Err(GenerationError::Empty);
        }
        tracing::info!(chars = outline.len(), "Outline generated");
        Ok(outline.to_string())
    }
}
