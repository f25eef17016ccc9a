//! # CarFuse Queue
//!
//! Durable work queue for deferred notifications and document filing.
//! Persistence is a single pretty-printed JSON array rewritten on every
//! mutation; low volume by design. Single writer per store — one process
//! owns the queue file at a time.

pub mod processor;
pub mod store;

pub use processor::{PassStats, QueueProcessor, QueueWorker};
pub use store::{QueueItem, QueueStore};
