//! Event execution — handler registry, priority ordering, and the
//! success/failed/skipped accounting per run.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use carfuse_core::config::RetryConfig;
use carfuse_core::error::{CarFuseError, Result};

use crate::events::{EventKind, EventOutcome, ScheduledEvent};

/// Work behind one event kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ScheduledEvent) -> Result<()>;
}

/// Per-run outcome counts.
///
/// `skipped` events had unmet preconditions and will be retried next run;
/// `failed` ones may need operator attention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The scheduler: a handler per event kind, events executed at most once
/// per invocation.
pub struct EventScheduler {
    events: Vec<ScheduledEvent>,
    handlers: HashMap<EventKind, Box<dyn EventHandler>>,
    retry: RetryConfig,
}

impl EventScheduler {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            events: Vec::new(),
            handlers: HashMap::new(),
            retry,
        }
    }

    /// Register the handler for an event kind. Once, at startup.
    pub fn register_handler(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
        tracing::info!("🗓️ Event handler registered: {kind}");
        self.handlers.insert(kind, handler);
    }

    pub fn add_event(&mut self, event: ScheduledEvent) {
        tracing::info!("📅 Event added: '{}' ({})", event.name, event.id);
        self.events.push(event);
    }

    pub fn remove_event(&mut self, id: &str) -> bool {
        let len = self.events.len();
        self.events.retain(|e| e.id != id);
        self.events.len() < len
    }

    pub fn list_events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    /// Execute a single event through its registered handler.
    pub async fn execute_event(&self, event: &ScheduledEvent) -> Result<()> {
        let handler = self
            .handlers
            .get(&event.kind)
            .ok_or_else(|| CarFuseError::UnknownEventType(event.kind.to_string()))?;
        handler.handle(event).await
    }

    /// Run every due event once, high priority first, insertion order
    /// within equal priority. Handler failures are logged and deferred,
    /// never allowed to crash the loop.
    pub async fn execute_all(&mut self, now: DateTime<Utc>) -> RunStats {
        let mut stats = RunStats::default();

        let mut order: Vec<usize> = (0..self.events.len())
            .filter(|&i| self.events[i].is_due(now))
            .collect();
        order.sort_by_key(|&i| (self.events[i].priority, i));

        // Dependencies are satisfied by any earlier success, including one
        // from this same pass.
        let mut satisfied: HashSet<String> = self
            .events
            .iter()
            .filter(|e| e.has_succeeded())
            .map(|e| e.id.clone())
            .collect();

        for index in order {
            let unmet = self.events[index]
                .depends_on
                .as_ref()
                .is_some_and(|dep| !satisfied.contains(dep));
            if unmet {
                let event = &mut self.events[index];
                tracing::info!(
                    "⏭️ Event '{}' skipped: dependency {:?} has not run yet",
                    event.name,
                    event.depends_on
                );
                event.last_outcome = Some(EventOutcome::Skipped);
                stats.skipped += 1;
                continue;
            }

            let result = self.execute_event(&self.events[index]).await;
            let retry = self.retry.clone();
            let event = &mut self.events[index];
            event.last_run = Some(now);

            match result {
                Ok(()) => {
                    tracing::info!("✅ Event '{}' executed", event.name);
                    event.run_count += 1;
                    event.attempts = 0;
                    event.last_outcome = Some(EventOutcome::Success);
                    satisfied.insert(event.id.clone());
                    match event.repeat_secs {
                        Some(secs) => event.due_at = now + Duration::seconds(secs as i64),
                        None => event.enabled = false,
                    }
                    stats.success += 1;
                }
                Err(e) => {
                    event.attempts += 1;
                    event.last_outcome = Some(EventOutcome::Failed(e.to_string()));
                    if event.attempts < retry.max_attempts {
                        // Time-deferred retry: the event becomes due again
                        // after the delay, not in a tight loop.
                        event.due_at = now + Duration::seconds(retry.interval_secs as i64);
                        tracing::warn!(
                            "⚠️ Event '{}' failed (attempt {}/{}), retrying at {}: {e}",
                            event.name,
                            event.attempts,
                            retry.max_attempts,
                            event.due_at
                        );
                    } else {
                        event.enabled = false;
                        tracing::error!(
                            "❌ Event '{}' failed {} times, disabling: {e}",
                            event.name,
                            event.attempts
                        );
                    }
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            "🗓️ Scheduler run: {} ok, {} failed, {} skipped",
            stats.success,
            stats.failed,
            stats.skipped
        );
        stats
    }
}
