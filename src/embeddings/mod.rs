// Embeddings module
// Single-text embedding providers and the bounded-concurrency batch embedder

pub mod batch;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::Result;

pub use batch::{BatchEmbedder, BatchProgress, PROGRESS_LOG_INTERVAL};
pub use ollama::{ModelInfo, OllamaClient};

/// A dense vector produced by an embedding model
pub type Embedding = Vec<f32>;

/// Turns one piece of text into one embedding.
///
/// Implementations make exactly one provider call per invocation and do no
/// caching or retrying. Failures surface as [`crate::KbError::EmbeddingProvider`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Embedding>;

    /// Identifier of the model producing the vectors
    fn model(&self) -> &str;
}
