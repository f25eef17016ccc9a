//! Queue processor — one linear pass over the stored items.
//!
//! At-least-once, non-prioritized, insertion order. Success removes an item;
//! failure increments its attempt count; any item whose attempts reach the
//! configured maximum is dropped at the end of its cycle, in the same pass
//! it just failed. Survivors are written back in one rewrite.

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use carfuse_core::error::Result;

use crate::store::{QueueItem, QueueStore};

/// The operation attempted for each queue item (notification send, document
/// filing). Errors are per-item; they never abort the pass.
#[async_trait]
pub trait QueueWorker: Send + Sync {
    async fn handle(&self, item: &QueueItem) -> Result<()>;
}

/// Outcome counts for one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Items attempted this pass.
    pub processed: usize,
    /// Attempts that succeeded (item removed).
    pub succeeded: usize,
    /// Failures kept for another pass.
    pub retried: usize,
    /// Items dropped after reaching max attempts.
    pub dropped: usize,
    /// Items skipped because their retry_after is still in the future.
    pub deferred: usize,
}

/// Single-writer processor over one queue store.
pub struct QueueProcessor<W: QueueWorker> {
    store: QueueStore,
    worker: W,
    max_attempts: u32,
}

impl<W: QueueWorker> QueueProcessor<W> {
    pub fn new(store: QueueStore, worker: W, max_attempts: u32) -> Self {
        Self {
            store,
            worker,
            max_attempts,
        }
    }

    /// Run one pass over the queue. Cancellation is checked between items;
    /// a cancelled pass still saves the surviving items before returning.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<PassStats> {
        let items = self.store.snapshot();
        let now = Utc::now();
        let mut stats = PassStats::default();
        let mut survivors: Vec<QueueItem> = Vec::with_capacity(items.len());
        let mut cancelled = false;

        for mut item in items {
            if cancelled || cancel.is_cancelled() {
                if !cancelled {
                    tracing::warn!("⏹️ Queue pass cancelled, keeping remaining items");
                    cancelled = true;
                }
                survivors.push(item);
                continue;
            }

            if item.retry_after.is_some_and(|t| t > now) {
                stats.deferred += 1;
                survivors.push(item);
                continue;
            }

            stats.processed += 1;
            let failed = match self.worker.handle(&item).await {
                Ok(()) => {
                    stats.succeeded += 1;
                    false
                }
                Err(e) => {
                    item.attempts += 1;
                    tracing::warn!(
                        "⚠️ Item {} failed (attempt {}/{}): {e}",
                        item.id,
                        item.attempts,
                        self.max_attempts
                    );
                    true
                }
            };

            // The max-attempts check runs after every attempt, so an item
            // that just failed for the last time is dropped in this same
            // pass rather than kept for one more.
            if item.attempts >= self.max_attempts {
                if failed {
                    stats.dropped += 1;
                    tracing::error!(
                        "❌ Item {} dropped after {} attempts",
                        item.id,
                        item.attempts
                    );
                }
                continue;
            }

            if failed {
                stats.retried += 1;
                survivors.push(item);
            }
        }

        // Survivors are reindexed contiguously; original positions are not
        // preserved.
        self.store.save(&survivors)?;

        tracing::info!(
            "📦 Queue pass: {} processed, {} ok, {} retried, {} dropped, {} deferred",
            stats.processed,
            stats.succeeded,
            stats.retried,
            stats.dropped,
            stats.deferred
        );
        Ok(stats)
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}
