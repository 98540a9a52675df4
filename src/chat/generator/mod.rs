#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{debug, warn};

use super::ChatError;
use super::prompt::ComposedPrompt;
use crate::model::{ConverseRequest, InferenceConfig, Message, ModelProvider, StopReason};

/// Result of a generation call that reached the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Completed(String),
    GuardrailIntervened,
}

pub struct ResponseGenerator {
    model: Arc<dyn ModelProvider>,
    model_id: String,
}

impl ResponseGenerator {
    #[inline]
    pub fn new(model: Arc<dyn ModelProvider>, model_id: String) -> Self {
        Self { model, model_id }
    }

    /// One model call with the composed prompt. Nothing is retried.
    #[inline]
    pub async fn generate(
        &self,
        prompt: &ComposedPrompt,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation, ChatError> {
        let request = ConverseRequest {
            model_id: self.model_id.clone(),
            messages: vec![Message::user_text(prompt.user.clone())],
            system: Some(prompt.system.clone()),
            inference: InferenceConfig {
                max_tokens,
                temperature,
            },
            guardrail: prompt.guardrail.clone(),
        };

        let output = self
            .model
            .converse(request)
            .await
            .map_err(ChatError::GenerationFailed)?;

        match output.stop_reason {
            StopReason::GuardrailIntervened => {
                warn!("Guardrail intervened in generation");
                Ok(Generation::GuardrailIntervened)
            }
            StopReason::MaxTokens => {
                warn!("Generation stopped at the max token limit ({})", max_tokens);
                Ok(Generation::Completed(output.text))
            }
            reason => {
                debug!("Generation finished with {:?}", reason);
                Ok(Generation::Completed(output.text))
            }
        }
    }
}
