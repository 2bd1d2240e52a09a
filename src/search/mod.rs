// Search module
// Query workflow: embed the query text, then rank the collection against it


use std::sync::Arc;
use tracing::debug;

use crate::database::{CollectionStore, SearchResult};
use crate::embeddings::BatchEmbedder;
use crate::{KbError, Result};

/// Answers free-text queries against the active collection
#[derive(Clone)]
pub struct SearchService {
    embedder: Arc<BatchEmbedder>,
    store: CollectionStore,
    result_count: usize,
}

impl SearchService {
    #[inline]
    pub fn new(embedder: Arc<BatchEmbedder>, store: CollectionStore, result_count: usize) -> Self {
        Self {
            embedder,
            store,
            result_count,
        }
    }

    #[inline]
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Top results for `query` using the configured result count
    #[inline]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search_with_limit(query, self.result_count).await
    }

    /// Up to `limit` results for `query`, nearest first.
    ///
    /// The collection is resolved on every call, so a search never triggers
    /// ingestion and always sees the most recent rebuild.
    #[inline]
    pub async fn search_with_limit(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(KbError::InvalidArgument(
                "Search query cannot be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(KbError::InvalidArgument(
                "Result count must be a positive integer".to_string(),
            ));
        }

        let collection = self.store.get_existing().await?;

        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            KbError::EmbeddingProvider("No embedding returned for query".to_string())
        })?;

        let results = collection.query(&vector, limit).await?;
        debug!("Query {:?} matched {} results", query, results.len());
        Ok(results)
    }
}
