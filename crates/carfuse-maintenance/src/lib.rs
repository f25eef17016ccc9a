//! # CarFuse Maintenance
//!
//! Scheduled housekeeping: age/status-based retention cleanup over files and
//! records, and full/incremental backup orchestration with checksum
//! validation, remote upload, and local retention pruning.

pub mod backup;
pub mod cleanup;
pub mod remote;

pub use backup::{BackupArtifact, BackupKind, BackupOrchestrator, SystemShell};
pub use cleanup::{CleanupManager, CleanupStats, CleanupStrategy, LogFileCleanup, RecordCleanup};
pub use remote::HttpRemoteStorage;
