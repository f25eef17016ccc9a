//! CarFuse configuration system.
//!
//! One TOML file covers every subsystem; each section deserializes with
//! per-field defaults so a partial config (or none at all) still yields a
//! working setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CarFuseError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarFuseConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Per-resource-kind cleanup policies, keyed by kind ("logs", "payments", ...).
    #[serde(default)]
    pub cleanup: HashMap<String, CleanupPolicy>,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CarFuseConfig {
    /// Load config from the default path (~/.carfuse/config.toml).
    /// Missing file means all defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CarFuseError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CarFuseError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CarFuse state directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carfuse")
    }
}

/// Durable queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding queue.json.
    #[serde(default = "default_queue_path")]
    pub path: String,
    /// Drop an item once its attempts reach this count.
    #[serde(default = "default_queue_attempts")]
    pub max_attempts: u32,
}

fn default_queue_path() -> String {
    CarFuseConfig::home_dir()
        .join("queue")
        .to_string_lossy()
        .into_owned()
}
fn default_queue_attempts() -> u32 {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            max_attempts: default_queue_attempts(),
        }
    }
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_templates_path")]
    pub templates_path: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub sms: GatewayConfig,
    #[serde(default)]
    pub push: GatewayConfig,
}

fn default_templates_path() -> String {
    CarFuseConfig::home_dir()
        .join("templates")
        .to_string_lossy()
        .into_owned()
}
fn default_locale() -> String {
    "en".into()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            templates_path: default_templates_path(),
            default_locale: default_locale(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            smtp: SmtpConfig::default(),
            sms: GatewayConfig::default(),
            push: GatewayConfig::default(),
        }
    }
}

/// Delivery retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Seconds before a failed delivery becomes eligible again.
    #[serde(default = "default_retry_interval")]
    pub interval_secs: u64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_interval() -> u64 {
    300
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            interval_secs: default_retry_interval(),
        }
    }
}

/// Batch dispatch policy (chunking + inter-chunk backpressure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Seconds to wait between chunks. Deliberate backpressure against
    /// downstream rate limits, not an optimization to skip.
    #[serde(default = "default_batch_delay")]
    pub delay_secs: u64,
}

fn default_batch_size() -> usize {
    50
}
fn default_batch_delay() -> u64 {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_secs: default_batch_delay(),
        }
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "noreply@carfuse.local".into()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_smtp_from(),
        }
    }
}

/// HTTP gateway settings shared by the SMS and push transports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Retention cleanup policy for one resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPolicy {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_cleanup_batch")]
    pub batch_size: usize,
    /// Back up each item before deleting it; a failed backup blocks that
    /// item's deletion.
    #[serde(default)]
    pub require_backup: bool,
    /// Statuses never deleted regardless of age.
    #[serde(default)]
    pub protected_statuses: Vec<String>,
    /// Ids never deleted regardless of age.
    #[serde(default)]
    pub excluded_ids: Vec<String>,
    /// Log severities never deleted regardless of age, matched against the
    /// log filename ("critical", "error", ...).
    #[serde(default)]
    pub critical_levels: Vec<String>,
    /// Filesystem path for file-based kinds (logs).
    #[serde(default)]
    pub path: Option<String>,
}

fn default_retention_days() -> i64 {
    30
}
fn default_cleanup_batch() -> usize {
    100
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            batch_size: default_cleanup_batch(),
            require_backup: false,
            protected_statuses: Vec::new(),
            excluded_ids: Vec::new(),
            critical_levels: Vec::new(),
            path: None,
        }
    }
}

/// Backup orchestration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub storage: BackupStorageConfig,
    #[serde(default)]
    pub database: DatabaseBackupConfig,
    #[serde(default)]
    pub files: FileBackupConfig,
    /// Skip local prune of backups whose remote copy is missing. Off by
    /// default to match the original behavior (prune unconditionally).
    #[serde(default)]
    pub verify_remote_before_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupStorageConfig {
    #[serde(default = "default_backup_local")]
    pub local_path: String,
    #[serde(default)]
    pub cloud: CloudStorageConfig,
}

fn default_backup_local() -> String {
    CarFuseConfig::home_dir()
        .join("backups")
        .to_string_lossy()
        .into_owned()
}

impl Default for BackupStorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_backup_local(),
            cloud: CloudStorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudStorageConfig {
    #[serde(default = "default_cloud_path")]
    pub path: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_cloud_path() -> String {
    "carfuse-backups".into()
}

impl Default for CloudStorageConfig {
    fn default() -> Self {
        Self {
            path: default_cloud_path(),
            provider: String::new(),
            url: String::new(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseBackupConfig {
    /// "mysql" or "postgres".
    #[serde(default = "default_db_engine")]
    pub engine: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "bool_true")]
    pub validate_checksum: bool,
    #[serde(default = "default_backup_retention")]
    pub retention_days: i64,
}

fn default_db_engine() -> String {
    "mysql".into()
}
fn default_db_host() -> String {
    "127.0.0.1".into()
}
fn default_backup_retention() -> i64 {
    14
}
fn bool_true() -> bool {
    true
}

impl Default for DatabaseBackupConfig {
    fn default() -> Self {
        Self {
            engine: default_db_engine(),
            host: default_db_host(),
            name: String::new(),
            user: String::new(),
            password: String::new(),
            validate_checksum: true,
            retention_days: default_backup_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackupConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_backup_retention")]
    pub retention_days: i64,
}

impl Default for FileBackupConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            exclude: Vec::new(),
            retention_days: default_backup_retention(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_retry")]
    pub retry: RetryConfig,
}

fn default_scheduler_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        interval_secs: 300,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CarFuseConfig::default();
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.notifications.retry.interval_secs, 300);
        assert_eq!(config.notifications.batch.size, 50);
        assert!(config.backup.database.validate_checksum);
        assert!(!config.backup.verify_remote_before_delete);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [queue]
            max_attempts = 5

            [notifications.batch]
            size = 10
            delay_secs = 1

            [cleanup.logs]
            retention_days = 30
            require_backup = true
            path = "/var/log/carfuse"

            [cleanup.payments]
            retention_days = 365
            protected_statuses = ["pending", "disputed"]

            [backup.database]
            engine = "postgres"
            name = "carfuse"
        "#;

        let config: CarFuseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.notifications.batch.size, 10);
        assert_eq!(config.cleanup["logs"].retention_days, 30);
        assert!(config.cleanup["logs"].require_backup);
        assert_eq!(
            config.cleanup["payments"].protected_statuses,
            vec!["pending", "disputed"]
        );
        assert_eq!(config.backup.database.engine, "postgres");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: CarFuseConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.notifications.default_locale, "en");
        assert_eq!(config.backup.database.retention_days, 14);
    }

    #[test]
    fn test_home_dir() {
        let home = CarFuseConfig::home_dir();
        assert!(home.to_string_lossy().contains("carfuse"));
    }
}
