// Stub embedders for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Embedder, Embedding};
use crate::corpus::Document;
use crate::{KbError, Result};

/// Maps known texts to one-hot vectors
pub(crate) struct OneHotEmbedder {
    dimension: usize,
    slots: HashMap<String, usize>,
}

impl OneHotEmbedder {
    /// Document `i` embeds to the unit vector along axis `i`
    pub(crate) fn for_documents(documents: &[Document]) -> Self {
        let slots = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (doc.embedding_text(), i))
            .collect();
        Self {
            dimension: documents.len(),
            slots,
        }
    }

    /// Make `text` embed to the same vector as the document at `index`
    pub(crate) fn with_alias(mut self, text: &str, index: usize) -> Self {
        self.slots.insert(text.to_string(), index);
        self
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl Embedder for OneHotEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let index = self.slots.get(text).copied().ok_or_else(|| {
            KbError::EmbeddingProvider(format!("no stub vector for {:?}", text))
        })?;
        let mut vector = vec![0.0; self.dimension];
        vector[index] = 1.0;
        Ok(vector)
    }

    fn model(&self) -> &str {
        "one-hot-stub"
    }
}

type DelayFn = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Embedder with scripted latency and failures that records concurrency
pub(crate) struct ScriptedEmbedder {
    delay: DelayFn,
    fail_on: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub(crate) fn new(delay: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        Self {
            delay: Box::new(delay),
            fail_on: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    /// Deterministic two-component vector for `text`
    pub(crate) fn vector_for(text: &str) -> Embedding {
        let sum: f32 = text.bytes().map(f32::from).sum();
        vec![text.len() as f32, sum]
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep((self.delay)(text)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.as_deref() == Some(text) {
            return Err(KbError::EmbeddingProvider(format!(
                "scripted failure for {}",
                text
            )));
        }
        Ok(Self::vector_for(text))
    }

    fn model(&self) -> &str {
        "scripted-stub"
    }
}
