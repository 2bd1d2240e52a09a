// Indexer module
// Rebuilds the collection from a corpus: embed everything first, then write


use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::corpus::{Document, validate_documents};
use crate::database::{CollectionRecord, CollectionStore, RecordMetadata};
use crate::embeddings::BatchEmbedder;
use crate::{KbError, Result};

/// Outcome of a completed ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    pub documents_ingested: usize,
    pub dimension: usize,
    pub collection: String,
}

/// Embedded records ready to be written, produced by [`Indexer::embed_documents`]
#[derive(Debug, Clone)]
pub struct EmbeddedCorpus {
    records: Vec<CollectionRecord>,
}

impl EmbeddedCorpus {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ingestion workflow over an injected embedder and collection store
pub struct Indexer {
    embedder: Arc<BatchEmbedder>,
    store: CollectionStore,
}

impl Indexer {
    #[inline]
    pub fn new(embedder: Arc<BatchEmbedder>, store: CollectionStore) -> Self {
        Self { embedder, store }
    }

    /// Replace the collection's contents with `documents`
    #[inline]
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestionStats> {
        self.ingest_with_cancel(documents, &CancellationToken::new())
            .await
    }

    /// Like [`Self::ingest`], aborting before any write once `cancel` fires.
    ///
    /// Runs [`Self::embed_documents`] then [`Self::write`]. A failure in the
    /// first leaves the previous collection intact; a failure in the second
    /// leaves it empty.
    #[inline]
    pub async fn ingest_with_cancel(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> Result<IngestionStats> {
        let corpus = self.embed_documents(documents, cancel).await?;
        self.write(&corpus).await
    }

    /// Validate and embed every document without touching the collection
    #[inline]
    pub async fn embed_documents(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> Result<EmbeddedCorpus> {
        validate_documents(documents)?;

        info!(
            "Ingesting {} documents into {} with model {}",
            documents.len(),
            self.store.name(),
            self.embedder.model()
        );

        let texts: Vec<String> = documents.iter().map(Document::embedding_text).collect();
        let embeddings = self.embedder.embed_batch_with_cancel(&texts, cancel).await?;

        if let Some(first) = embeddings.first() {
            if first.len() != self.store.dimension() {
                warn!(
                    "Model {} produced {} dimensions, expected {}",
                    self.embedder.model(),
                    first.len(),
                    self.store.dimension()
                );
                return Err(KbError::EmbeddingProvider(format!(
                    "Model {} produces {}-dimensional embeddings but embedding_dimension is {}",
                    self.embedder.model(),
                    first.len(),
                    self.store.dimension()
                )));
            }
        }

        if cancel.is_cancelled() {
            return Err(KbError::Cancelled);
        }

        let records = documents
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|((doc, raw_text), embedding)| CollectionRecord {
                id: doc.id.clone(),
                embedding,
                raw_text,
                metadata: RecordMetadata {
                    title: doc.title.clone(),
                },
            })
            .collect();

        Ok(EmbeddedCorpus { records })
    }

    /// Replace the collection with `corpus`.
    ///
    /// On failure the collection is left empty, never partly written.
    #[inline]
    pub async fn write(&self, corpus: &EmbeddedCorpus) -> Result<IngestionStats> {
        let collection = self.store.create_fresh().await?;

        if let Err(e) = collection.add_records(&corpus.records).await {
            warn!("Writing {} failed: {}", collection.name(), e);
            if let Err(clear_err) = collection.delete_all().await {
                error!(
                    "Failed to clear {} after write failure: {}",
                    collection.name(),
                    clear_err
                );
            }
            return Err(e);
        }
        debug!(
            "Wrote {} records to {}",
            corpus.records.len(),
            collection.name()
        );

        info!(
            "Ingested {} documents into {}",
            corpus.records.len(),
            collection.name()
        );

        Ok(IngestionStats {
            documents_ingested: corpus.records.len(),
            dimension: collection.dimension(),
            collection: collection.name().to_string(),
        })
    }
}
