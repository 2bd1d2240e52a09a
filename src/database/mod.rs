// Vector storage
// A narrow engine interface, its LanceDB implementation, and the collection
// ownership layer the workflows talk to

pub mod collection;
pub mod lancedb;

pub use self::collection::{Collection, CollectionStore, SearchResult};
pub use self::lancedb::LanceIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::embeddings::Embedding;

/// Metadata stored alongside each record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub title: String,
}

/// The unit stored in a collection, one per document
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub id: String,
    pub embedding: Embedding,
    /// Text the embedding was computed from
    pub raw_text: String,
    pub metadata: RecordMetadata,
}

/// One nearest-neighbour match as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub raw_text: String,
    pub metadata: RecordMetadata,
    pub distance: f32,
}

/// Named-collection storage engine.
///
/// Operations on a collection that does not exist fail with
/// [`crate::KbError::CollectionNotFound`]; every other engine failure is a
/// [`crate::KbError::VectorIndex`].
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create an empty collection holding vectors of `dimension` components
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// Vector dimension of an existing collection
    async fn dimension(&self, name: &str) -> Result<usize>;

    async fn add(&self, name: &str, records: &[CollectionRecord]) -> Result<()>;

    /// Every record in the collection, in no particular order
    async fn fetch_all(&self, name: &str) -> Result<Vec<CollectionRecord>>;

    /// Remove every record, keeping the collection and its dimension
    async fn clear(&self, name: &str) -> Result<()>;

    async fn count(&self, name: &str) -> Result<usize>;

    /// Up to `limit` records nearest to `vector`, ascending by distance
    async fn query(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>>;
}
