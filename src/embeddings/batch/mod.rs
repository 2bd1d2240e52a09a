
use indicatif::ProgressBar;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Embedder, Embedding};
use crate::{KbError, Result};

/// Completed-unit interval at which batch progress is logged
pub const PROGRESS_LOG_INTERVAL: usize = 100;

/// Completed and total texts summed over every batch currently running on one
/// [`BatchEmbedder`]; the counts reset when a batch starts on an idle embedder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// Fans texts out to an [`Embedder`] with a hard cap on in-flight requests.
///
/// Output order always matches input order: every unit carries its input
/// index and lands in a slot of a preallocated buffer, regardless of the
/// order in which provider calls finish. The first failing unit aborts the
/// whole batch.
///
/// The ceiling belongs to the embedder, not to a call: concurrent batches on a
/// shared embedder draw from the same permits.
pub struct BatchEmbedder {
    embedder: Arc<dyn Embedder>,
    concurrency: usize,
    permits: Arc<Semaphore>,
    progress_bar: ProgressBar,
    progress: watch::Sender<BatchProgress>,
    // Only touched inside `progress.send_modify`
    running: AtomicUsize,
}

impl BatchEmbedder {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            embedder,
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
            progress_bar: ProgressBar::hidden(),
            progress,
            running: AtomicUsize::new(0),
        }
    }

    /// Drive the given bar while embedding; the bar is hidden by default
    #[inline]
    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> Self {
        self.progress_bar = progress_bar;
        self
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[inline]
    pub fn model(&self) -> &str {
        self.embedder.model()
    }

    /// Watch completed/total counts of the batches currently running
    #[inline]
    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Embed every text; `output[i]` is the embedding of `texts[i]`
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.embed_batch_with_cancel(texts, &CancellationToken::new())
            .await
    }

    /// Like [`Self::embed_batch`], but stops issuing provider calls and fails
    /// with [`KbError::Cancelled`] once `cancel` fires
    #[inline]
    pub async fn embed_batch_with_cancel(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(KbError::Cancelled);
        }

        let total = texts.len();
        debug!(
            "Embedding {} texts with model {} (concurrency {})",
            total,
            self.embedder.model(),
            self.concurrency
        );

        let mut tracker = ProgressTracker::start(self, total);
        let mut tasks = JoinSet::new();

        for (index, text) in texts.iter().enumerate() {
            let embedder = Arc::clone(&self.embedder);
            let semaphore = Arc::clone(&self.permits);
            let cancel = cancel.clone();
            let text = text.clone();

            tasks.spawn(async move {
                // The permit is held for the whole provider call
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return (index, Err(KbError::Cancelled)),
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (index, Err(KbError::Cancelled));
                };

                (index, embedder.embed_one(&text).await)
            });
        }

        let mut slots: Vec<Option<Embedding>> = vec![None; total];
        let mut dimension: Option<usize> = None;

        loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!(
                        "Embedding batch cancelled after {}/{} texts",
                        tracker.completed, total
                    );
                    tasks.abort_all();
                    return Err(KbError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let (index, result) = joined.map_err(|e| {
                KbError::EmbeddingProvider(format!("Embedding task failed: {}", e))
            })?;

            let embedding = match result {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!("Embedding text {} of {} failed: {}", index + 1, total, e);
                    tasks.abort_all();
                    return Err(e);
                }
            };

            match dimension {
                None => dimension = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    tasks.abort_all();
                    return Err(KbError::EmbeddingProvider(format!(
                        "Inconsistent embedding dimension: expected {}, got {} for text {}",
                        expected,
                        embedding.len(),
                        index + 1
                    )));
                }
                Some(_) => {}
            }

            slots[index] = Some(embedding);
            tracker.complete_one();
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    KbError::EmbeddingProvider(format!("Missing embedding for text {}", index + 1))
                })
            })
            .collect()
    }
}

/// Adds one batch to the embedder's shared progress and removes whatever it
/// left unfinished when dropped
struct ProgressTracker<'a> {
    batch: &'a BatchEmbedder,
    total: usize,
    completed: usize,
}

impl<'a> ProgressTracker<'a> {
    fn start(batch: &'a BatchEmbedder, total: usize) -> Self {
        batch.progress.send_modify(|progress| {
            if batch.running.fetch_add(1, Ordering::SeqCst) == 0 {
                *progress = BatchProgress::default();
            }
            progress.total += total;
            batch.progress_bar.set_length(progress.total as u64);
            batch.progress_bar.set_position(progress.completed as u64);
        });
        Self {
            batch,
            total,
            completed: 0,
        }
    }

    fn complete_one(&mut self) {
        self.completed += 1;
        self.batch.progress.send_modify(|progress| {
            progress.completed += 1;
            self.batch
                .progress_bar
                .set_position(progress.completed as u64);
        });

        if self.completed % PROGRESS_LOG_INTERVAL == 0 || self.completed == self.total {
            info!("Embedded {}/{} texts", self.completed, self.total);
        }
    }
}

impl Drop for ProgressTracker<'_> {
    fn drop(&mut self) {
        let unfinished = self.total - self.completed;
        self.batch.progress.send_modify(|progress| {
            self.batch.running.fetch_sub(1, Ordering::SeqCst);
            progress.total -= unfinished;
            self.batch.progress_bar.set_length(progress.total as u64);
        });
    }
}
