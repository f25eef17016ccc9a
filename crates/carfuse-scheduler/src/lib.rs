//! # CarFuse Scheduler
//!
//! Timed maintenance jobs: notification sweeps, retention cleanup, data
//! processing. Events execute at most once per invocation, ordered by
//! priority then insertion; a failed event is re-scheduled after a delay
//! rather than retried in a loop, and an event with an unmet dependency is
//! skipped, not failed.

pub mod events;
pub mod executor;

pub use events::{EventKind, EventOutcome, ScheduledEvent};
pub use executor::{EventHandler, EventScheduler, RunStats};
