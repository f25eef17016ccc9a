//! Collaborator seams.
//!
//! The core never talks to the ORM, the filesystem-of-record, cloud storage,
//! or the system shell directly — it goes through these traits. Production
//! implementations live in the leaf crates; tests swap in in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Renders a notification template to its final content.
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` for `locale`, substituting values from `data`.
    /// Implementations fall back to the default locale when the localized
    /// template is absent.
    fn render(
        &self,
        template: &str,
        locale: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String>;
}

/// Remote storage for backup artifacts.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Upload `bytes` under `remote_path`.
    async fn put(&self, remote_path: &str, bytes: &[u8]) -> Result<()>;

    /// Whether an object exists under `remote_path`.
    async fn exists(&self, remote_path: &str) -> Result<bool>;
}

/// Runs a shell command, returning (stdout, exit code).
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn exec(&self, command: &str) -> Result<(String, i32)>;
}

/// A record eligible for retention cleanup.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator for record-based cleanup (payments, audit rows).
/// Stands in for the application's ORM, which is out of scope here.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of the given resource kind.
    async fn list(&self, kind: &str) -> Result<Vec<Record>>;

    /// Delete one record by id.
    async fn delete(&self, kind: &str, id: &str) -> Result<()>;

    /// Export one record before deletion (pre-delete backup hook).
    async fn export(&self, kind: &str, id: &str) -> Result<Vec<u8>>;
}
