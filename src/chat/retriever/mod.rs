
use std::sync::Arc;

use tracing::{debug, warn};

use super::ChatError;
use crate::knowledge::{KnowledgeDocument, KnowledgeStore};

/// Documents retrieved for one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieval {
    pub documents: Vec<KnowledgeDocument>,
    /// Source of each document, in rank order
    pub sources: Vec<String>,
}

impl Retrieval {
    #[inline]
    pub fn from_documents(documents: Vec<KnowledgeDocument>) -> Self {
        let sources = documents.iter().map(|d| d.source.clone()).collect();
        Self { documents, sources }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct Retriever {
    store: Arc<KnowledgeStore>,
}

impl Retriever {
    #[inline]
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval, ChatError> {
        let documents = self
            .store
            .similarity_search(query, k)
            .await
            .map_err(ChatError::RetrievalFailed)?;

        let retrieval = Retrieval::from_documents(documents);
        if retrieval.is_empty() {
            warn!("No knowledge documents available for query; answering without context");
        } else {
            debug!("Retrieved {} documents (k={})", retrieval.documents.len(), k);
        }
        Ok(retrieval)
    }
}
