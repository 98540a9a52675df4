// Knowledge store module
// Append-only vehicle knowledge documents backed by a pluggable vector index


pub mod ingest;
pub mod lance;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

pub use lance::LanceIndex;
pub use memory::MemoryIndex;

/// Source of the document a fresh index is seeded with
pub const PLACEHOLDER_SOURCE: &str = "placeholder";
const REBUILD_BATCH_SIZE: usize = 32;
const PLACEHOLDER_CONTENT: &str = "차량 지식 베이스가 초기화되었습니다. 아직 등록된 차량 정보가 없습니다.";

/// One retrievable unit of vehicle knowledge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub content: String,
    pub source: String,
}

impl KnowledgeDocument {
    #[inline]
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }

    #[inline]
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_CONTENT, PLACEHOLDER_SOURCE)
    }
}

/// A document together with the embedding computed at insertion time
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: String,
    pub document: KnowledgeDocument,
    pub vector: Vec<f32>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: KnowledgeDocument,
    /// Higher is more similar
    pub score: f32,
}

/// Nearest-neighbour storage for embedded documents.
///
/// Implementations must make `append` durable before returning and must
/// order `search` results by descending similarity, breaking ties by
/// insertion order.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn append(&self, documents: Vec<IndexedDocument>) -> Result<()>;

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<usize>;

    /// Remove every document; only used by a full rebuild
    async fn clear(&self) -> Result<()>;
}

/// Knowledge store: embeds documents and delegates storage to a [`VectorIndex`]
pub struct KnowledgeStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Wrap an index without seeding it
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            write_lock: Mutex::new(()),
        }
    }

    /// Wrap an index, seeding it with the placeholder document when empty
    #[inline]
    pub async fn initialize(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = Self::new(index, embedder);

        if store.index.count().await? == 0 {
            info!("Knowledge index is empty, seeding placeholder document");
            store.add_documents(&[KnowledgeDocument::placeholder()]).await?;
        }

        Ok(store)
    }

    /// Open the persisted LanceDB index at `path`, creating it when missing.
    ///
    /// A path that exists but cannot be read fails with
    /// [`RagError::StoreUnavailable`].
    #[inline]
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index = LanceIndex::open(path).await?;
        Self::initialize(Arc::new(index), embedder).await
    }

    /// Append documents. Only the new documents are embedded, and the call
    /// returns once the index has persisted them.
    #[inline]
    pub async fn add_documents(&self, documents: &[KnowledgeDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        self.append_locked(documents).await
    }

    async fn append_locked(&self, documents: &[KnowledgeDocument]) -> Result<()> {
        let indexed = self.embed_documents(documents).await?;
        self.index.append(indexed).await?;
        debug!("Appended {} knowledge documents", documents.len());
        Ok(())
    }

    async fn embed_documents(
        &self,
        documents: &[KnowledgeDocument],
    ) -> Result<Vec<IndexedDocument>> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != documents.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                documents.len(),
                vectors.len()
            )));
        }

        let created_at = Utc::now().to_rfc3339();
        Ok(documents
            .iter()
            .zip(vectors)
            .map(|(document, vector)| IndexedDocument {
                id: Uuid::new_v4().to_string(),
                document: document.clone(),
                vector,
                created_at: created_at.clone(),
            })
            .collect())
    }

    /// Replace every document with `documents`.
    ///
    /// All documents are embedded before the index is touched, so an
    /// embedding failure leaves the previous contents in place. An empty
    /// batch leaves the placeholder document behind so the index is never
    /// observed empty after a rebuild.
    #[inline]
    pub async fn rebuild(&self, documents: &[KnowledgeDocument]) -> Result<usize> {
        self.rebuild_with_progress(documents, |_| {}).await
    }

    /// [`Self::rebuild`], reporting after each embedded batch
    #[inline]
    pub async fn rebuild_with_progress<F>(
        &self,
        documents: &[KnowledgeDocument],
        progress: F,
    ) -> Result<usize>
    where
        F: Fn(usize) + Send + Sync,
    {
        let _guard = self.write_lock.lock().await;

        let mut indexed = Vec::with_capacity(documents.len().max(1));
        if documents.is_empty() {
            indexed.extend(self.embed_documents(&[KnowledgeDocument::placeholder()]).await?);
        }
        for batch in documents.chunks(REBUILD_BATCH_SIZE) {
            indexed.extend(self.embed_documents(batch).await?);
            progress(batch.len());
        }

        self.index.clear().await?;
        self.index.append(indexed).await?;

        let count = self.index.count().await?;
        info!("Knowledge index rebuilt with {} documents", count);
        Ok(count)
    }

    /// Up to `k` documents ordered by descending similarity to `query`
    #[inline]
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeDocument>> {
        Ok(self
            .similarity_search_with_scores(query, k)
            .await?
            .into_iter()
            .map(|scored| scored.document)
            .collect())
    }

    #[inline]
    pub async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let mut results = self.index.search(&query_vector, k).await?;
        results.truncate(k);

        debug!("Similarity search returned {} documents", results.len());
        Ok(results)
    }

    #[inline]
    pub async fn document_count(&self) -> Result<usize> {
        self.index.count().await
    }
}
