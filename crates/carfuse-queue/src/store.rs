//! File-based queue store — lightweight persistence.
//! The whole queue is one JSON array, serialized as a unit on every
//! mutation. Human-readable, trivially inspectable on a stuck host.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carfuse_core::error::{CarFuseError, Result};

/// One unit of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    /// Opaque payload; the worker decides what it means.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Incremented only by the processing loop.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Not eligible for processing before this time. Set by the notification
    /// retry path.
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
}

/// File-backed queue store.
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    /// Create a new queue store at the given directory.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.to_path_buf(),
        }
    }

    fn file(&self) -> PathBuf {
        self.path.join("queue.json")
    }

    /// Append a new item with attempts=0 and persist the full queue.
    pub fn push(
        &self,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Result<QueueItem> {
        self.push_inner(payload, None)
    }

    /// Append an item that becomes eligible only after `retry_after`.
    pub fn push_deferred(
        &self,
        payload: serde_json::Map<String, serde_json::Value>,
        retry_after: DateTime<Utc>,
    ) -> Result<QueueItem> {
        self.push_inner(payload, Some(retry_after))
    }

    fn push_inner(
        &self,
        payload: serde_json::Map<String, serde_json::Value>,
        retry_after: Option<DateTime<Utc>>,
    ) -> Result<QueueItem> {
        let item = QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
            retry_after,
        };
        let mut items = self.snapshot();
        items.push(item.clone());
        self.save(&items)?;
        tracing::debug!("📥 Enqueued item {} (queue depth {})", item.id, items.len());
        Ok(item)
    }

    /// Read the full queue. A missing, unreadable, or corrupt file yields an
    /// empty queue — never an error.
    pub fn snapshot(&self) -> Vec<QueueItem> {
        let file = self.file();
        if !file.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", file.display());
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", file.display());
                Vec::new()
            }
        }
    }

    /// Atomically rewrite the persisted queue: write to a temp file in the
    /// same directory, then rename over the live one.
    pub fn save(&self, items: &[QueueItem]) -> Result<()> {
        let file = self.file();
        let tmp = self.path.join("queue.json.tmp");
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| CarFuseError::QueuePersistence(format!("serialize: {e}")))?;
        std::fs::write(&tmp, &json)
            .map_err(|e| CarFuseError::QueuePersistence(format!("write temp: {e}")))?;
        std::fs::rename(&tmp, &file)
            .map_err(|e| CarFuseError::QueuePersistence(format!("rename: {e}")))?;
        tracing::debug!("💾 Saved {} queue items to {}", items.len(), file.display());
        Ok(())
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
