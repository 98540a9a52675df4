// Embeddings module
// Text-to-vector providers used by the knowledge store

pub mod ollama;
pub mod titan;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::config::{Config, EmbeddingProviderKind};
use crate::model::BedrockClient;

pub use ollama::OllamaEmbedder;
pub use titan::TitanEmbedder;

/// Converts text into fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Build the provider selected by `[embedding].provider`
#[inline]
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => {
            let embedder = OllamaEmbedder::new(&config.embedding.ollama)
                .context("Failed to create Ollama embedder")?;
            Ok(Arc::new(embedder))
        }
        EmbeddingProviderKind::Bedrock => {
            let client =
                BedrockClient::new(&config.bedrock).context("Failed to create Bedrock client")?;
            Ok(Arc::new(TitanEmbedder::new(
                client,
                config.embedding.titan_model.clone(),
                config.embedding.dimension,
            )))
        }
    }
}
