#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::EmbeddingProvider;
use crate::RagError;
use crate::model::BedrockClient;

/// Titan text embeddings served through the Bedrock invoke endpoint
#[derive(Debug, Clone)]
pub struct TitanEmbedder {
    client: BedrockClient,
    model_id: String,
    dimension: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    input_text_token_count: Option<u32>,
}

impl TitanEmbedder {
    #[inline]
    pub fn new(client: BedrockClient, model_id: String, dimension: u32) -> Self {
        Self {
            client,
            model_id,
            dimension,
        }
    }

    #[inline]
    pub fn generate_embedding_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "inputText": text,
            "dimensions": self.dimension,
            "normalize": true,
        });

        let response_text = self.client.invoke_blocking(&self.model_id, &body)?;
        let response: TitanResponse =
            serde_json::from_str(&response_text).context("Failed to parse Titan response")?;

        debug!(
            "Titan embedding with {} dimensions ({:?} input tokens)",
            response.embedding.len(),
            response.input_text_token_count
        );

        Ok(response.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for TitanEmbedder {
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let embedder = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.generate_embedding_blocking(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }
}
