//! # CarFuse — Back-Office Maintenance CLI
//!
//! Cron entry points for the notification queue, retention cleanup, backup
//! orchestration, and scheduled events.
//!
//! Usage:
//!   carfuse process-queue                  # Drain due queue items once
//!   carfuse send --channel email \
//!       --recipient u-17 --email a@b.pl \
//!       --template booking_confirmation    # Send one notification
//!   carfuse cleanup [--kind logs]          # Retention cleanup
//!   carfuse backup database [--incremental]
//!   carfuse backup files
//!   carfuse backup prune
//!   carfuse events                         # Execute due scheduled events

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use carfuse_core::config::CarFuseConfig;
use carfuse_core::types::{ChannelKind, NotificationRequest, Recipient};
use carfuse_maintenance::{
    BackupOrchestrator, CleanupManager, HttpRemoteStorage, LogFileCleanup, SystemShell,
};
use carfuse_notify::{
    Dispatcher, FileTemplates, PushTransport, QueuedNotificationWorker, SmsTransport, SmtpMailer,
};
use carfuse_queue::{QueueProcessor, QueueStore};
use carfuse_scheduler::{EventHandler, EventKind, EventScheduler, ScheduledEvent};

#[derive(Parser)]
#[command(name = "carfuse", version, about = "🚗 CarFuse back-office maintenance")]
struct Cli {
    /// Config file path (default: ~/.carfuse/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one processing pass over the durable notification queue
    ProcessQueue,

    /// Send a single notification
    Send {
        /// Delivery channel: email, sms, or push
        #[arg(long)]
        channel: ChannelKind,

        /// Recipient id
        #[arg(long)]
        recipient: String,

        /// Recipient email address
        #[arg(long)]
        email: Option<String>,

        /// Recipient phone number
        #[arg(long)]
        phone: Option<String>,

        /// Recipient push device token
        #[arg(long)]
        device_token: Option<String>,

        /// Template name
        #[arg(long)]
        template: String,

        /// Template data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,

        /// Recipient locale
        #[arg(long, default_value = "en")]
        locale: String,
    },

    /// Run retention cleanup for every configured kind, or one kind
    Cleanup {
        #[arg(long)]
        kind: Option<String>,
    },

    /// Database/file backups and local retention pruning
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Execute due scheduled maintenance events once
    Events,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Dump the database, validate the artifact, and upload it
    Database {
        #[arg(long)]
        incremental: bool,
    },
    /// Archive the configured file paths and upload the archive
    Files,
    /// Delete local backups older than their retention window
    Prune,
}

fn build_dispatcher(config: &CarFuseConfig) -> Result<Dispatcher> {
    let notif = &config.notifications;
    let templates = FileTemplates::new(Path::new(&notif.templates_path), &notif.default_locale);
    let queue = QueueStore::new(Path::new(&config.queue.path));
    let mut dispatcher = Dispatcher::new(
        Box::new(templates),
        queue,
        notif.retry.clone(),
        notif.batch.clone(),
    );

    if !notif.smtp.host.is_empty() {
        dispatcher.register(Box::new(SmtpMailer::new(notif.smtp.clone())?));
    }
    if !notif.sms.url.is_empty() {
        dispatcher.register(Box::new(SmsTransport::new(notif.sms.clone())));
    }
    if !notif.push.url.is_empty() {
        dispatcher.register(Box::new(PushTransport::new(notif.push.clone())));
    }
    Ok(dispatcher)
}

fn build_cleanup(config: &CarFuseConfig) -> CleanupManager {
    let mut manager = CleanupManager::new(config.cleanup.clone());
    for (kind, policy) in &config.cleanup {
        if policy.path.is_none() {
            // Record-backed kinds need a record store; the CLI only wires
            // filesystem strategies.
            tracing::warn!("⚠️ Cleanup kind '{kind}' has no path, skipping");
            continue;
        }
        let backup_dir = policy
            .require_backup
            .then(|| PathBuf::from(&config.backup.storage.local_path).join("cleanup"));
        manager.register(Box::new(LogFileCleanup::new(kind, backup_dir)));
    }
    manager
}

fn build_orchestrator(config: &CarFuseConfig) -> BackupOrchestrator {
    BackupOrchestrator::new(
        config.backup.clone(),
        Box::new(SystemShell::default()),
        Box::new(HttpRemoteStorage::new(config.backup.storage.cloud.clone())),
    )
}

/// Ctrl-C flips the token; in-flight passes finish their current item and
/// persist survivors.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⏹️ Interrupt received, finishing current item");
            handle.cancel();
        }
    });
    cancel
}

struct QueueSweepHandler {
    processor: QueueProcessor<QueuedNotificationWorker>,
    cancel: CancellationToken,
}

#[async_trait]
impl EventHandler for QueueSweepHandler {
    async fn handle(&self, _event: &ScheduledEvent) -> carfuse_core::Result<()> {
        self.processor.process(&self.cancel).await.map(|_| ())
    }
}

struct CleanupHandler {
    manager: CleanupManager,
}

#[async_trait]
impl EventHandler for CleanupHandler {
    async fn handle(&self, _event: &ScheduledEvent) -> carfuse_core::Result<()> {
        self.manager.run_all(chrono::Utc::now()).await;
        Ok(())
    }
}

struct BackupPruneHandler {
    orchestrator: BackupOrchestrator,
}

#[async_trait]
impl EventHandler for BackupPruneHandler {
    async fn handle(&self, _event: &ScheduledEvent) -> carfuse_core::Result<()> {
        self.orchestrator.cleanup_old_backups().await.map(|_| ())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "carfuse=debug,carfuse_core=debug,carfuse_queue=debug,carfuse_notify=debug,carfuse_maintenance=debug,carfuse_scheduler=debug"
    } else {
        "carfuse=info,carfuse_core=info,carfuse_queue=info,carfuse_notify=info,carfuse_maintenance=info,carfuse_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => CarFuseConfig::load_from(path)?,
        None => CarFuseConfig::load()?,
    };

    match cli.command {
        Command::ProcessQueue => {
            let dispatcher = Arc::new(build_dispatcher(&config)?);
            let processor = QueueProcessor::new(
                QueueStore::new(Path::new(&config.queue.path)),
                QueuedNotificationWorker::new(dispatcher),
                config.queue.max_attempts,
            );
            let stats = processor.process(&cancel_on_ctrl_c()).await?;
            println!(
                "📦 Queue pass: {} processed, {} ok, {} retried, {} dropped, {} deferred",
                stats.processed, stats.succeeded, stats.retried, stats.dropped, stats.deferred
            );
        }

        Command::Send {
            channel,
            recipient,
            email,
            phone,
            device_token,
            template,
            data,
            locale,
        } => {
            let dispatcher = build_dispatcher(&config)?;
            let mut rcpt = Recipient::new(&recipient);
            rcpt.email = email;
            rcpt.phone = phone;
            rcpt.device_token = device_token;
            rcpt.locale = locale;

            let mut request = NotificationRequest::new(rcpt, channel, &template);
            request.data = serde_json::from_str(&data)
                .map_err(|e| anyhow::anyhow!("--data must be a JSON object: {e}"))?;

            if dispatcher.send(&request).await? {
                println!("✅ Notification '{template}' sent via {channel}");
            } else {
                println!("🔕 Notification '{template}' not delivered (opt-out or retry budget spent)");
            }
        }

        Command::Cleanup { kind } => {
            let manager = build_cleanup(&config);
            let now = chrono::Utc::now();
            match kind {
                Some(kind) => {
                    let stats = manager.run_kind(&kind, now).await?;
                    println!(
                        "🧹 Cleanup '{kind}': {} scanned, {} deleted, {} protected, {} errors",
                        stats.scanned, stats.deleted, stats.protected, stats.errors
                    );
                }
                None => {
                    for (kind, stats) in manager.run_all(now).await {
                        println!(
                            "🧹 Cleanup '{kind}': {} scanned, {} deleted, {} protected, {} errors",
                            stats.scanned, stats.deleted, stats.protected, stats.errors
                        );
                    }
                }
            }
        }

        Command::Backup { action } => {
            let orchestrator = build_orchestrator(&config);
            match action {
                BackupAction::Database { incremental } => {
                    let artifact = orchestrator.create_database_backup(incremental).await?;
                    println!("✅ Database backup: {}", artifact.local_path.display());
                }
                BackupAction::Files => {
                    let artifact = orchestrator.create_file_backup().await?;
                    println!("✅ File backup: {}", artifact.local_path.display());
                }
                BackupAction::Prune => {
                    let deleted = orchestrator.cleanup_old_backups().await?;
                    println!("🗑️ Pruned {deleted} stale backup(s)");
                }
            }
        }

        Command::Events => {
            let cancel = cancel_on_ctrl_c();
            let dispatcher = Arc::new(build_dispatcher(&config)?);
            let processor = QueueProcessor::new(
                QueueStore::new(Path::new(&config.queue.path)),
                QueuedNotificationWorker::new(dispatcher),
                config.queue.max_attempts,
            );

            let mut scheduler = EventScheduler::new(config.scheduler.retry.clone());
            scheduler.register_handler(
                EventKind::Notification,
                Box::new(QueueSweepHandler { processor, cancel }),
            );
            scheduler.register_handler(
                EventKind::Cleanup,
                Box::new(CleanupHandler {
                    manager: build_cleanup(&config),
                }),
            );
            scheduler.register_handler(
                EventKind::DataProcessing,
                Box::new(BackupPruneHandler {
                    orchestrator: build_orchestrator(&config),
                }),
            );

            let now = chrono::Utc::now();
            scheduler.add_event(ScheduledEvent::new(
                "notification-sweep",
                EventKind::Notification,
                1,
                serde_json::json!({}),
                now,
            ));
            scheduler.add_event(ScheduledEvent::new(
                "retention-cleanup",
                EventKind::Cleanup,
                2,
                serde_json::json!({}),
                now,
            ));
            scheduler.add_event(ScheduledEvent::new(
                "backup-prune",
                EventKind::DataProcessing,
                3,
                serde_json::json!({}),
                now,
            ));

            let stats = scheduler.execute_all(now).await;
            println!(
                "🗓️ Events: {} ok, {} failed, {} skipped",
                stats.success, stats.failed, stats.skipped
            );
        }
    }

    Ok(())
}
