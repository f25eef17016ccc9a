//! CarFuse error taxonomy.
//!
//! Per-item delivery and cleanup errors are caught and logged by the callers
//! that iterate batches; backup errors propagate fail-fast with the stage
//! that broke.

use thiserror::Error;

/// Which backup stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    /// The dump/archive command itself (non-zero exit, spawn failure).
    Command,
    /// Checksum validation of the produced artifact.
    Validation,
    /// Upload to remote storage.
    Upload,
}

impl std::fmt::Display for BackupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStage::Command => write!(f, "command"),
            BackupStage::Validation => write!(f, "validation"),
            BackupStage::Upload => write!(f, "upload"),
        }
    }
}

/// All errors surfaced by the CarFuse core crates.
#[derive(Debug, Error)]
pub enum CarFuseError {
    /// No transport registered for the requested channel.
    #[error("unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// No handler registered for the scheduled event type.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Transport send failure. Retryable up to the configured max attempts;
    /// transient and permanent failures are deliberately not distinguished.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Template missing in both the requested and the default locale, or
    /// unreadable.
    #[error("template error: {0}")]
    Template(String),

    /// A backup stage failed. No partial success: the artifact is unusable.
    #[error("backup failed at {stage} stage: {message}")]
    Backup {
        stage: BackupStage,
        message: String,
    },

    /// Queue file write/serialize failure. Reads never produce this: a
    /// missing or corrupt queue file degrades to an empty queue.
    #[error("queue persistence: {0}")]
    QueuePersistence(String),

    /// Record store (external persistence collaborator) failure.
    #[error("record store: {0}")]
    RecordStore(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CarFuseError {
    /// Shorthand for stage-tagged backup failures.
    pub fn backup(stage: BackupStage, message: impl Into<String>) -> Self {
        CarFuseError::Backup {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CarFuseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_error_carries_stage() {
        let err = CarFuseError::backup(BackupStage::Command, "exit code 2");
        assert!(err.to_string().contains("command"));
        match err {
            CarFuseError::Backup { stage, .. } => assert_eq!(stage, BackupStage::Command),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(BackupStage::Validation.to_string(), "validation");
        assert_eq!(BackupStage::Upload.to_string(), "upload");
    }
}
