//! Backup orchestrator.
//!
//! Database dumps and file archives are produced by shelling out to the
//! engine's own tooling, optionally checksum-validated, uploaded to remote
//! storage, and pruned locally by age. Each stage is fail-fast: a partial
//! backup is worse than a failed one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use carfuse_core::config::BackupConfig;
use carfuse_core::error::{BackupStage, CarFuseError, Result};
use carfuse_core::traits::{RemoteStorage, ShellExecutor};

/// What kind of artifact a backup run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Full,
    Incremental,
    Files,
}

impl BackupKind {
    /// Local filename prefix for this kind.
    fn prefix(&self) -> &'static str {
        match self {
            BackupKind::Full => "db-full-",
            BackupKind::Incremental => "db-incremental-",
            BackupKind::Files => "files-",
        }
    }
}

/// A produced backup, exclusively owned until uploaded.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub kind: BackupKind,
    pub local_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub validated: bool,
}

/// Shell executor over `sh -c`, with a hard timeout so a wedged dump can be
/// killed.
pub struct SystemShell {
    timeout_secs: u64,
}

impl SystemShell {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new(900)
    }
}

#[async_trait]
impl ShellExecutor for SystemShell {
    async fn exec(&self, command: &str) -> Result<(String, i32)> {
        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();
        let output = tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), run)
            .await
            .map_err(|_| {
                CarFuseError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("command timed out after {}s", self.timeout_secs),
                ))
            })??;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok((stdout, output.status.code().unwrap_or(-1)))
    }
}

pub struct BackupOrchestrator {
    config: BackupConfig,
    shell: Box<dyn ShellExecutor>,
    remote: Box<dyn RemoteStorage>,
}

impl BackupOrchestrator {
    pub fn new(
        config: BackupConfig,
        shell: Box<dyn ShellExecutor>,
        remote: Box<dyn RemoteStorage>,
    ) -> Self {
        Self {
            config,
            shell,
            remote,
        }
    }

    fn local_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.storage.local_path)
    }

    fn timestamp() -> String {
        Utc::now().format("%Y%m%d-%H%M%S").to_string()
    }

    /// Build the dump command for the configured engine.
    fn dump_command(&self, out: &Path) -> Result<String> {
        let db = &self.config.database;
        let cmd = match db.engine.as_str() {
            "mysql" => format!(
                "mysqldump -h{} -u{} -p'{}' {} > {}",
                db.host,
                db.user,
                db.password,
                db.name,
                out.display()
            ),
            "postgres" => format!(
                "PGPASSWORD='{}' pg_dump -h {} -U {} {} > {}",
                db.password,
                db.host,
                db.user,
                db.name,
                out.display()
            ),
            other => {
                return Err(CarFuseError::Config(format!(
                    "unsupported database engine: {other}"
                )))
            }
        };
        Ok(cmd)
    }

    /// Produce, validate, and upload a database dump. Fail-fast: any stage
    /// failing raises a stage-tagged error and nothing later runs.
    pub async fn create_database_backup(&self, incremental: bool) -> Result<BackupArtifact> {
        let kind = if incremental {
            BackupKind::Incremental
        } else {
            BackupKind::Full
        };
        std::fs::create_dir_all(self.local_dir())?;
        let filename = format!("{}{}.sql", kind.prefix(), Self::timestamp());
        let out = self.local_dir().join(&filename);

        let command = self.dump_command(&out)?;
        tracing::info!("🗄️ Running database backup ({:?})", kind);
        let (output, code) = self
            .shell
            .exec(&command)
            .await
            .map_err(|e| CarFuseError::backup(BackupStage::Command, e.to_string()))?;
        if code != 0 {
            return Err(CarFuseError::backup(
                BackupStage::Command,
                format!("exit code {code}: {output}"),
            ));
        }

        let validated = if self.config.database.validate_checksum {
            self.validate_checksum(&out)?;
            true
        } else {
            false
        };

        self.upload(&out, &filename).await?;

        tracing::info!("✅ Database backup complete: {}", out.display());
        Ok(BackupArtifact {
            kind,
            local_path: out,
            created_at: Utc::now(),
            validated,
        })
    }

    /// Archive the configured paths (minus excludes) and upload the archive.
    pub async fn create_file_backup(&self) -> Result<BackupArtifact> {
        if self.config.files.paths.is_empty() {
            return Err(CarFuseError::backup(
                BackupStage::Command,
                "no file backup paths configured",
            ));
        }
        std::fs::create_dir_all(self.local_dir())?;
        let filename = format!("{}{}.tar.gz", BackupKind::Files.prefix(), Self::timestamp());
        let out = self.local_dir().join(&filename);

        let excludes: String = self
            .config
            .files
            .exclude
            .iter()
            .map(|p| format!(" --exclude='{p}'"))
            .collect();
        let paths = self.config.files.paths.join(" ");
        let command = format!("tar czf {}{excludes} {paths}", out.display());

        tracing::info!("🗜️ Archiving {} path(s)", self.config.files.paths.len());
        let (output, code) = self
            .shell
            .exec(&command)
            .await
            .map_err(|e| CarFuseError::backup(BackupStage::Command, e.to_string()))?;
        if code != 0 {
            return Err(CarFuseError::backup(
                BackupStage::Command,
                format!("exit code {code}: {output}"),
            ));
        }

        self.upload(&out, &filename).await?;

        tracing::info!("✅ File backup complete: {}", out.display());
        Ok(BackupArtifact {
            kind: BackupKind::Files,
            local_path: out,
            created_at: Utc::now(),
            validated: false,
        })
    }

    /// SHA-256 the artifact and write a `.sha256` sidecar. An empty or
    /// unreadable artifact fails validation.
    fn validate_checksum(&self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)
            .map_err(|e| CarFuseError::backup(BackupStage::Validation, e.to_string()))?;
        if bytes.is_empty() {
            return Err(CarFuseError::backup(
                BackupStage::Validation,
                format!("{} is empty", path.display()),
            ));
        }
        let digest = Sha256::digest(&bytes);
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        std::fs::write(path.with_extension("sha256"), &hex)
            .map_err(|e| CarFuseError::backup(BackupStage::Validation, e.to_string()))?;
        tracing::debug!("🔏 Checksum {hex} for {}", path.display());
        Ok(())
    }

    async fn upload(&self, local: &Path, filename: &str) -> Result<()> {
        let bytes = std::fs::read(local)
            .map_err(|e| CarFuseError::backup(BackupStage::Upload, e.to_string()))?;
        let remote_path = format!("{}/{filename}", self.config.storage.cloud.path);
        self.remote
            .put(&remote_path, &bytes)
            .await
            .map_err(|e| CarFuseError::backup(BackupStage::Upload, e.to_string()))?;
        tracing::info!("☁️ Uploaded {remote_path} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Delete local backups older than their kind's retention cutoff, by
    /// file modification time. With `verify_remote_before_delete` set, a
    /// file whose remote copy is missing is kept and logged instead.
    pub async fn cleanup_old_backups(&self) -> Result<usize> {
        let dir = self.local_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut deleted = 0;

        let retention_for = |name: &str| -> Option<i64> {
            if name.starts_with(BackupKind::Files.prefix()) {
                Some(self.config.files.retention_days)
            } else if name.starts_with("db-") {
                Some(self.config.database.retention_days)
            } else {
                None
            }
        };

        for entry in std::fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(retention_days) = retention_for(&name) else {
                continue;
            };
            let modified: DateTime<Utc> = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t.into(),
                Err(_) => continue,
            };
            if modified >= now - Duration::days(retention_days) {
                continue;
            }

            if self.config.verify_remote_before_delete {
                let remote_path = format!("{}/{name}", self.config.storage.cloud.path);
                match self.remote.exists(&remote_path).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!("⚠️ No remote copy of {name}, keeping local file");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Remote check for {name} failed, keeping it: {e}");
                        continue;
                    }
                }
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    tracing::info!("🧹 Pruned old backup {name}");
                }
                Err(e) => tracing::warn!("⚠️ Failed to prune {name}: {e}"),
            }
        }

        Ok(deleted)
    }
}
