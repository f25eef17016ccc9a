//! Retention cleanup engine.
//!
//! Each strategy handles one resource kind; the manager runs them in
//! registration order and isolates failures so one broken strategy never
//! blocks the rest. Deletion is best-effort per item: a failed pre-delete
//! backup fails that item and moves on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use carfuse_core::config::CleanupPolicy;
use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::traits::RecordStore;

/// Per-run statistics for one resource kind.
///
/// `scanned` counts only cutoff-eligible candidates, so
/// `scanned == deleted + protected + errors` holds for every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub scanned: usize,
    pub deleted: usize,
    pub protected: usize,
    pub errors: usize,
}

impl CleanupStats {
    /// One error and nothing else — used when a whole strategy fails.
    pub fn strategy_error() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }
}

/// One resource kind's cleanup behavior.
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    fn kind(&self) -> &str;

    async fn run(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> Result<CleanupStats>;
}

/// Age-based cleanup of log files under a directory, by modification time.
pub struct LogFileCleanup {
    kind: String,
    /// Pre-delete copies land here when the policy requires a backup.
    backup_dir: Option<PathBuf>,
}

impl LogFileCleanup {
    pub fn new(kind: &str, backup_dir: Option<PathBuf>) -> Self {
        Self {
            kind: kind.to_string(),
            backup_dir,
        }
    }
}

#[async_trait]
impl CleanupStrategy for LogFileCleanup {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn run(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> Result<CleanupStats> {
        let dir = policy.path.as_deref().ok_or_else(|| {
            CarFuseError::Config(format!("cleanup.{}: no path configured", self.kind))
        })?;
        let cutoff = now - Duration::days(policy.retention_days);
        let mut stats = CleanupStats::default();

        let entries = std::fs::read_dir(dir)?;
        for entry in entries.flatten() {
            if stats.scanned >= policy.batch_size {
                break;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t.into(),
                Err(e) => {
                    tracing::warn!("⚠️ No mtime for {}: {e}", path.display());
                    continue;
                }
            };
            if modified >= cutoff {
                continue; // young files are not candidates
            }

            stats.scanned += 1;
            let name = entry.file_name().to_string_lossy().into_owned();
            let shielded = policy.excluded_ids.iter().any(|id| id == &name)
                || policy.critical_levels.iter().any(|lvl| name.contains(lvl.as_str()));
            if shielded {
                stats.protected += 1;
                continue;
            }

            if policy.require_backup {
                if let Err(e) = self.backup_file(&path, &name) {
                    tracing::warn!("⚠️ Pre-delete backup of {name} failed, keeping it: {e}");
                    stats.errors += 1;
                    continue;
                }
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    stats.deleted += 1;
                    tracing::info!("🧹 Deleted stale log {name}");
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to delete {name}: {e}");
                    stats.errors += 1;
                }
            }
        }

        Ok(stats)
    }
}

impl LogFileCleanup {
    fn backup_file(&self, path: &std::path::Path, name: &str) -> Result<()> {
        let dir = self
            .backup_dir
            .as_ref()
            .ok_or_else(|| CarFuseError::Config("no backup dir for pre-delete copies".into()))?;
        std::fs::create_dir_all(dir)?;
        std::fs::copy(path, dir.join(name))?;
        Ok(())
    }
}

/// Age/status-based cleanup of records (payments, audit rows) behind the
/// RecordStore collaborator.
pub struct RecordCleanup {
    kind: String,
    store: Arc<dyn RecordStore>,
}

impl RecordCleanup {
    pub fn new(kind: &str, store: Arc<dyn RecordStore>) -> Self {
        Self {
            kind: kind.to_string(),
            store,
        }
    }
}

#[async_trait]
impl CleanupStrategy for RecordCleanup {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn run(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> Result<CleanupStats> {
        let cutoff = now - Duration::days(policy.retention_days);
        let mut stats = CleanupStats::default();

        let records = self.store.list(&self.kind).await?;
        for record in records {
            if stats.scanned >= policy.batch_size {
                break;
            }
            if record.created_at >= cutoff {
                continue;
            }

            stats.scanned += 1;
            let shielded = policy.protected_statuses.contains(&record.status)
                || policy.excluded_ids.contains(&record.id);
            if shielded {
                stats.protected += 1;
                continue;
            }

            if policy.require_backup {
                if let Err(e) = self.store.export(&self.kind, &record.id).await {
                    tracing::warn!(
                        "⚠️ Export of {}/{} failed, keeping it: {e}",
                        self.kind,
                        record.id
                    );
                    stats.errors += 1;
                    continue;
                }
            }

            match self.store.delete(&self.kind, &record.id).await {
                Ok(()) => stats.deleted += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Delete of {}/{} failed: {e}", self.kind, record.id);
                    stats.errors += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Runs all registered strategies sequentially, in registration order.
pub struct CleanupManager {
    strategies: Vec<Box<dyn CleanupStrategy>>,
    policies: HashMap<String, CleanupPolicy>,
}

impl CleanupManager {
    pub fn new(policies: HashMap<String, CleanupPolicy>) -> Self {
        Self {
            strategies: Vec::new(),
            policies,
        }
    }

    pub fn register(&mut self, strategy: Box<dyn CleanupStrategy>) {
        tracing::info!("🧰 Cleanup strategy registered: {}", strategy.kind());
        self.strategies.push(strategy);
    }

    fn policy_for(&self, kind: &str) -> CleanupPolicy {
        self.policies.get(kind).cloned().unwrap_or_default()
    }

    /// Run one strategy by kind.
    pub async fn run_kind(&self, kind: &str, now: DateTime<Utc>) -> Result<CleanupStats> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.kind() == kind)
            .ok_or_else(|| CarFuseError::Config(format!("no cleanup strategy for '{kind}'")))?;
        strategy.run(&self.policy_for(kind), now).await
    }

    /// Run every strategy. One strategy's failure never aborts the others.
    pub async fn run_all(&self, now: DateTime<Utc>) -> Vec<(String, CleanupStats)> {
        let mut results = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let kind = strategy.kind().to_string();
            let policy = self.policy_for(&kind);
            let stats = match strategy.run(&policy, now).await {
                Ok(stats) => {
                    tracing::info!(
                        "🧹 Cleanup '{kind}': {} scanned, {} deleted, {} protected, {} errors",
                        stats.scanned,
                        stats.deleted,
                        stats.protected,
                        stats.errors
                    );
                    stats
                }
                Err(e) => {
                    tracing::error!("❌ Cleanup '{kind}' failed: {e}");
                    CleanupStats::strategy_error()
                }
            };
            results.push((kind, stats));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use carfuse_core::traits::Record;

    struct FakeRecords {
        records: Mutex<Vec<Record>>,
        fail_export: bool,
    }

    impl FakeRecords {
        fn new(records: Vec<Record>) -> Self {
            Self {
                records: Mutex::new(records),
                fail_export: false,
            }
        }
    }

    #[async_trait]
    impl RecordStore for FakeRecords {
        async fn list(&self, _kind: &str) -> Result<Vec<Record>> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn delete(&self, _kind: &str, id: &str) -> Result<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn export(&self, _kind: &str, id: &str) -> Result<Vec<u8>> {
            if self.fail_export {
                Err(CarFuseError::RecordStore(format!("export {id} failed")))
            } else {
                Ok(b"exported".to_vec())
            }
        }
    }

    fn record(id: &str, status: &str, age_days: i64) -> Record {
        Record {
            id: id.to_string(),
            status: status.to_string(),
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn policy(retention_days: i64) -> CleanupPolicy {
        CleanupPolicy {
            retention_days,
            ..CleanupPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_old_records_deleted_young_left_alone() {
        let store = Arc::new(FakeRecords::new(vec![
            record("old-1", "done", 40),
            record("young-1", "done", 10),
        ]));
        let cleanup = RecordCleanup::new("payments", store.clone());

        let stats = cleanup.run(&policy(30), Utc::now()).await.unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(store.records.lock().unwrap().len(), 1);
        assert_eq!(store.records.lock().unwrap()[0].id, "young-1");
    }

    #[tokio::test]
    async fn test_protected_status_survives_regardless_of_age() {
        let store = Arc::new(FakeRecords::new(vec![
            record("old-disputed", "disputed", 400),
            record("old-done", "done", 400),
        ]));
        let cleanup = RecordCleanup::new("payments", store.clone());
        let mut policy = policy(30);
        policy.protected_statuses = vec!["disputed".into()];

        let stats = cleanup.run(&policy, Utc::now()).await.unwrap();
        assert_eq!(stats.protected, 1);
        assert_eq!(stats.deleted, 1);
        assert!(store
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.id == "old-disputed"));
    }

    #[tokio::test]
    async fn test_failed_backup_blocks_deletion() {
        let mut fake = FakeRecords::new(vec![record("old-1", "done", 40)]);
        fake.fail_export = true;
        let store = Arc::new(fake);
        let cleanup = RecordCleanup::new("payments", store.clone());
        let mut policy = policy(30);
        policy.require_backup = true;

        let stats = cleanup.run(&policy, Utc::now()).await.unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(store.records.lock().unwrap().len(), 1, "item kept");
    }

    #[tokio::test]
    async fn test_accounting_identity_holds() {
        let mut fake = FakeRecords::new(vec![
            record("a", "done", 40),
            record("b", "disputed", 50),
            record("c", "done", 60),
            record("d", "done", 5),
        ]);
        fake.fail_export = true;
        let store = Arc::new(fake);
        let cleanup = RecordCleanup::new("payments", store);
        let mut policy = policy(30);
        policy.protected_statuses = vec!["disputed".into()];
        policy.excluded_ids = vec!["c".into()];
        policy.require_backup = true;

        let stats = cleanup.run(&policy, Utc::now()).await.unwrap();
        assert_eq!(stats.scanned, stats.deleted + stats.protected + stats.errors);
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.protected, 2);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn test_batch_size_caps_one_run() {
        let store = Arc::new(FakeRecords::new(
            (0..10).map(|i| record(&format!("r-{i}"), "done", 40)).collect(),
        ));
        let cleanup = RecordCleanup::new("payments", store.clone());
        let mut policy = policy(30);
        policy.batch_size = 4;

        let stats = cleanup.run(&policy, Utc::now()).await.unwrap();
        assert_eq!(stats.scanned, 4);
        assert_eq!(store.records.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_log_files_deleted_by_retention_zero() {
        let dir = std::env::temp_dir().join("carfuse-test-cleanup-logs");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("app.log"), "old").unwrap();
        std::fs::write(dir.join("audit.log"), "old").unwrap();

        let cleanup = LogFileCleanup::new("logs", None);
        let mut policy = policy(0);
        policy.path = Some(dir.to_string_lossy().into_owned());
        policy.excluded_ids = vec!["audit.log".into()];

        // retention 0 makes every existing file a candidate
        let stats = cleanup
            .run(&policy, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.protected, 1);
        assert!(!dir.join("app.log").exists());
        assert!(dir.join("audit.log").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_critical_level_logs_are_protected() {
        let dir = std::env::temp_dir().join("carfuse-test-cleanup-critical");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("critical-2020-01.log"), "old").unwrap();
        std::fs::write(dir.join("debug-2020-01.log"), "old").unwrap();

        let cleanup = LogFileCleanup::new("logs", None);
        let mut policy = policy(0);
        policy.path = Some(dir.to_string_lossy().into_owned());
        policy.critical_levels = vec!["critical".into()];

        let stats = cleanup
            .run(&policy, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(stats.protected, 1);
        assert_eq!(stats.deleted, 1);
        assert!(dir.join("critical-2020-01.log").exists());
        assert!(!dir.join("debug-2020-01.log").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_young_log_files_untouched() {
        let dir = std::env::temp_dir().join("carfuse-test-cleanup-young");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("fresh.log"), "new").unwrap();

        let cleanup = LogFileCleanup::new("logs", None);
        let mut policy = policy(30);
        policy.path = Some(dir.to_string_lossy().into_owned());

        let stats = cleanup.run(&policy, Utc::now()).await.unwrap();
        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.deleted, 0);
        assert!(dir.join("fresh.log").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_manager_isolates_strategy_failures() {
        struct Exploding;

        #[async_trait]
        impl CleanupStrategy for Exploding {
            fn kind(&self) -> &str {
                "exploding"
            }
            async fn run(&self, _p: &CleanupPolicy, _n: DateTime<Utc>) -> Result<CleanupStats> {
                Err(CarFuseError::Config("boom".into()))
            }
        }

        let store = Arc::new(FakeRecords::new(vec![record("old-1", "done", 40)]));
        let mut manager = CleanupManager::new(HashMap::new());
        manager.register(Box::new(Exploding));
        manager.register(Box::new(RecordCleanup::new("payments", store)));

        let results = manager.run_all(Utc::now()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "exploding");
        assert_eq!(results[0].1.errors, 1);
        assert_eq!(results[1].1.deleted, 1, "later strategy still ran");
    }
}
