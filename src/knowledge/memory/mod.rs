
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexedDocument, ScoredDocument, VectorIndex};
use crate::{RagError, Result};

/// Brute-force cosine index held in memory. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<Vec<IndexedDocument>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn append(&self, documents: Vec<IndexedDocument>) -> Result<()> {
        let mut stored = self.documents.write().await;

        let dimension = stored
            .first()
            .or_else(|| documents.first())
            .map(|d| d.vector.len());
        if let Some(dimension) = dimension {
            if documents.iter().any(|d| d.vector.len() != dimension) {
                return Err(RagError::Store(format!(
                    "Vector dimension mismatch: expected {}",
                    dimension
                )));
            }
        }

        stored.extend(documents);
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        let stored = self.documents.read().await;

        if let Some(first) = stored.first() {
            if first.vector.len() != query.len() {
                return Err(RagError::Store(format!(
                    "Query dimension {} does not match index dimension {}",
                    query.len(),
                    first.vector.len()
                )));
            }
        }

        let mut scored: Vec<ScoredDocument> = stored
            .iter()
            .map(|d| ScoredDocument {
                document: d.document.clone(),
                score: cosine_similarity(query, &d.vector),
            })
            .collect();

        // stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().await.clear();
        Ok(())
    }
}
