//! Scheduled event definitions — the data model for timed work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What family of work an event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Notification,
    Cleanup,
    DataProcessing,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Notification => "notification",
            EventKind::Cleanup => "cleanup",
            EventKind::DataProcessing => "data_processing",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Failed(String),
    Skipped,
}

/// A scheduled maintenance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub name: String,
    pub kind: EventKind,
    /// 1 = high .. 3 = low. Due events run high priority first, insertion
    /// order within a priority.
    pub priority: u8,
    pub payload: serde_json::Value,
    pub due_at: DateTime<Utc>,
    /// Run only after this event id has succeeded at least once.
    #[serde(default)]
    pub depends_on: Option<String>,
    /// Re-arm this many seconds after a successful run; one-shot when None.
    #[serde(default)]
    pub repeat_secs: Option<u64>,
    /// Consecutive failures since the last success.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_outcome: Option<EventOutcome>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl ScheduledEvent {
    pub fn new(
        name: &str,
        kind: EventKind,
        priority: u8,
        payload: serde_json::Value,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind,
            priority: priority.clamp(1, 3),
            payload,
            due_at,
            depends_on: None,
            repeat_secs: None,
            attempts: 0,
            run_count: 0,
            last_run: None,
            last_outcome: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn depends_on(mut self, event_id: &str) -> Self {
        self.depends_on = Some(event_id.to_string());
        self
    }

    pub fn repeating(mut self, every_secs: u64) -> Self {
        self.repeat_secs = Some(every_secs);
        self
    }

    /// Whether this event should run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.due_at <= now
    }

    /// Whether this event has ever completed successfully.
    pub fn has_succeeded(&self) -> bool {
        self.run_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_check() {
        let now = Utc::now();
        let event = ScheduledEvent::new(
            "nightly-cleanup",
            EventKind::Cleanup,
            2,
            serde_json::json!({}),
            now - chrono::Duration::minutes(1),
        );
        assert!(event.is_due(now));

        let mut future = event.clone();
        future.due_at = now + chrono::Duration::minutes(5);
        assert!(!future.is_due(now));

        let mut disabled = event;
        disabled.enabled = false;
        assert!(!disabled.is_due(now));
    }

    #[test]
    fn test_priority_is_clamped() {
        let event = ScheduledEvent::new(
            "x",
            EventKind::Notification,
            9,
            serde_json::json!({}),
            Utc::now(),
        );
        assert_eq!(event.priority, 3);
    }
}
