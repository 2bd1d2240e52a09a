
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{CollectionRecord, IndexHit, VectorIndex};
use crate::{KbError, Result};

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub document: String,
    pub distance: f32,
}

impl From<IndexHit> for SearchResult {
    #[inline]
    fn from(hit: IndexHit) -> Self {
        Self {
            id: hit.id,
            title: hit.metadata.title,
            document: hit.raw_text,
            distance: hit.distance,
        }
    }
}

/// Owns the lifecycle of one named collection
#[derive(Clone)]
pub struct CollectionStore {
    index: Arc<dyn VectorIndex>,
    name: String,
    dimension: usize,
}

impl CollectionStore {
    /// `dimension` is used when the collection is (re)created
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, name: impl Into<String>, dimension: usize) -> Self {
        Self {
            index,
            name: name.into(),
            dimension,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension a freshly created collection will hold
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Drop the collection if it exists, then create it empty
    #[inline]
    pub async fn create_fresh(&self) -> Result<Collection> {
        match self.index.drop_collection(&self.name).await {
            Ok(()) => debug!("Dropped previous collection {}", self.name),
            Err(KbError::CollectionNotFound(_)) => {
                debug!("No previous collection {} to drop", self.name);
            }
            Err(e) => return Err(e),
        }

        self.index
            .create_collection(&self.name, self.dimension)
            .await?;

        info!("Created fresh collection {}", self.name);
        Ok(self.handle(self.dimension))
    }

    /// Open the collection, failing with [`KbError::CollectionNotFound`] if
    /// it was never created
    #[inline]
    pub async fn get_existing(&self) -> Result<Collection> {
        if !self.index.has_collection(&self.name).await? {
            return Err(KbError::CollectionNotFound(self.name.clone()));
        }
        let dimension = self.index.dimension(&self.name).await?;
        Ok(self.handle(dimension))
    }

    fn handle(&self, dimension: usize) -> Collection {
        Collection {
            index: Arc::clone(&self.index),
            name: self.name.clone(),
            dimension,
        }
    }
}

/// Handle to an existing collection
#[derive(Clone)]
pub struct Collection {
    index: Arc<dyn VectorIndex>,
    name: String,
    dimension: usize,
}

impl std::fmt::Debug for Collection {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl Collection {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.index.count(&self.name).await
    }

    #[inline]
    pub async fn fetch_all(&self) -> Result<Vec<CollectionRecord>> {
        self.index.fetch_all(&self.name).await
    }

    /// Remove every record and return how many were removed
    #[inline]
    pub async fn delete_all(&self) -> Result<usize> {
        let removed = self.index.count(&self.name).await?;
        if removed == 0 {
            debug!("Collection {} is already empty", self.name);
            return Ok(0);
        }

        self.index.clear(&self.name).await?;
        info!("Deleted {} records from {}", removed, self.name);
        Ok(removed)
    }

    /// Bulk insert; duplicate ids are left to the index engine
    #[inline]
    pub async fn add_records(&self, records: &[CollectionRecord]) -> Result<()> {
        if let Some(bad) = records
            .iter()
            .find(|record| record.embedding.len() != self.dimension)
        {
            return Err(KbError::VectorIndex(format!(
                "Record {} has {} dimensions, collection {} expects {}",
                bad.id,
                bad.embedding.len(),
                self.name,
                self.dimension
            )));
        }

        self.index.add(&self.name, records).await?;
        debug!("Added {} records to {}", records.len(), self.name);
        Ok(())
    }

    /// Up to `k` nearest records, ascending by distance
    #[inline]
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(KbError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if vector.len() != self.dimension {
            return Err(KbError::VectorIndex(format!(
                "Query vector has {} dimensions, collection {} expects {}",
                vector.len(),
                self.name,
                self.dimension
            )));
        }

        let hits = self.index.query(&self.name, vector, k).await?;
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }
}
