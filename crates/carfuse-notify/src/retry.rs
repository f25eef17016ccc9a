//! Consecutive-failure tracking per (channel, recipient, template).
//!
//! An explicit context object owned by the dispatcher rather than process
//! globals. The backing store is injectable: the in-memory map serves both
//! production runs and tests; counts do not survive a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use carfuse_core::types::ChannelKind;

/// Key for one delivery stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetryKey {
    pub channel: ChannelKind,
    pub recipient: String,
    pub template: String,
}

impl RetryKey {
    pub fn new(channel: ChannelKind, recipient: &str, template: &str) -> Self {
        Self {
            channel,
            recipient: recipient.to_string(),
            template: template.to_string(),
        }
    }
}

impl std::fmt::Display for RetryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.recipient, self.template)
    }
}

/// Pluggable counter backend.
pub trait RetryStore: Send + Sync {
    /// Bump the counter and return the new value.
    fn increment(&self, key: &RetryKey) -> u32;

    /// Clear the counter (successful delivery).
    fn reset(&self, key: &RetryKey);

    fn count(&self, key: &RetryKey) -> u32;
}

/// Process-local counter map.
#[derive(Default)]
pub struct InMemoryRetryStore {
    counts: Mutex<HashMap<RetryKey, u32>>,
}

impl RetryStore for InMemoryRetryStore {
    fn increment(&self, key: &RetryKey) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&self, key: &RetryKey) {
        self.counts.lock().unwrap().remove(key);
    }

    fn count(&self, key: &RetryKey) -> u32 {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

/// Failure tracker consulted on every delivery error.
pub struct RetryTracker {
    store: Box<dyn RetryStore>,
}

impl RetryTracker {
    pub fn new(store: Box<dyn RetryStore>) -> Self {
        Self { store }
    }

    /// Tracker over the in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryRetryStore::default()))
    }

    pub fn increment(&self, key: &RetryKey) -> u32 {
        self.store.increment(key)
    }

    pub fn reset(&self, key: &RetryKey) {
        self.store.reset(key);
    }

    pub fn count(&self, key: &RetryKey) -> u32 {
        self.store.count(key)
    }
}
