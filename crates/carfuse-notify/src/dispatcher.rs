//! Notification dispatcher — resolves a transport by channel, renders the
//! template, and delivers. Delivery failures are tracked per
//! (channel, recipient, template) and requeued as deferred work until the
//! retry budget runs out.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use carfuse_core::config::{BatchConfig, RetryConfig};
use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::traits::TemplateRenderer;
use carfuse_core::types::{ChannelKind, NotificationRequest, Recipient};
use carfuse_queue::QueueStore;

use crate::retry::{RetryKey, RetryTracker};
use crate::templates::split_subject;
use crate::transport::Transport;

/// Aggregate outcome of a batch send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    transports: HashMap<ChannelKind, Box<dyn Transport>>,
    templates: Box<dyn TemplateRenderer>,
    retry: RetryTracker,
    queue: QueueStore,
    retry_cfg: RetryConfig,
    batch_cfg: BatchConfig,
}

impl Dispatcher {
    pub fn new(
        templates: Box<dyn TemplateRenderer>,
        queue: QueueStore,
        retry_cfg: RetryConfig,
        batch_cfg: BatchConfig,
    ) -> Self {
        Self {
            transports: HashMap::new(),
            templates,
            retry: RetryTracker::in_memory(),
            queue,
            retry_cfg,
            batch_cfg,
        }
    }

    /// Swap the retry tracker (e.g. for a persistent counter store).
    pub fn with_retry_tracker(mut self, retry: RetryTracker) -> Self {
        self.retry = retry;
        self
    }

    /// Register a transport for its channel. One registration per channel,
    /// at startup.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        let kind = transport.channel();
        tracing::info!("🔌 Transport registered: {kind}");
        self.transports.insert(kind, transport);
    }

    fn transport(&self, channel: ChannelKind) -> Result<&dyn Transport> {
        self.transports
            .get(&channel)
            .map(|t| t.as_ref())
            .ok_or_else(|| CarFuseError::UnsupportedChannel(channel.to_string()))
    }

    /// Render and deliver, with no retry bookkeeping. Used directly by the
    /// queue worker, where the processor owns the attempt counting.
    ///
    /// `Ok(false)` means the recipient opted out — a no-op, not a failure.
    pub async fn deliver_now(&self, request: &NotificationRequest) -> Result<bool> {
        let transport = self.transport(request.channel)?;

        if !request.recipient.accepts(request.channel) {
            tracing::debug!(
                "🔕 {} opted out of {}, skipping '{}'",
                request.recipient.id,
                request.channel,
                request.template
            );
            return Ok(false);
        }

        let rendered = self.templates.render(
            &request.template,
            &request.recipient.locale,
            &request.data,
        )?;
        let (subject, body) = split_subject(&rendered);
        let subject = subject.unwrap_or_else(|| request.template.clone());

        transport.deliver(&request.recipient, &subject, &body).await?;
        Ok(true)
    }

    /// Send one notification.
    ///
    /// Returns `Ok(true)` when delivered or accepted for retry, `Ok(false)`
    /// when the recipient opted out or the retry budget for this key is
    /// exhausted. An unregistered channel is an error.
    pub async fn send(&self, request: &NotificationRequest) -> Result<bool> {
        let key = RetryKey::new(request.channel, &request.recipient.id, &request.template);
        match self.deliver_now(request).await {
            Ok(true) => {
                self.retry.reset(&key);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(CarFuseError::Delivery(e)) => {
                tracing::warn!("⚠️ Delivery failed for {key}: {e}");
                self.handle_retry(request, &key)
            }
            // Template and configuration errors are not delivery failures;
            // retrying them cannot help.
            Err(other) => Err(other),
        }
    }

    /// Bookkeeping after a failed delivery: under the budget, persist a
    /// deferred retry and report "accepted"; at the budget, give up for
    /// this key.
    fn handle_retry(&self, request: &NotificationRequest, key: &RetryKey) -> Result<bool> {
        let count = self.retry.increment(key);
        if count < self.retry_cfg.max_attempts {
            let retry_after =
                chrono::Utc::now() + chrono::Duration::seconds(self.retry_cfg.interval_secs as i64);
            let mut payload = serde_json::Map::new();
            payload.insert("type".into(), "notification".into());
            payload.insert(
                "request".into(),
                serde_json::to_value(request)
                    .map_err(|e| CarFuseError::QueuePersistence(format!("encode request: {e}")))?,
            );
            self.queue.push_deferred(payload, retry_after)?;
            tracing::info!(
                "🔁 {key} queued for retry {count}/{} at {retry_after}",
                self.retry_cfg.max_attempts
            );
            Ok(true)
        } else {
            tracing::error!("❌ {key} failed {count} consecutive times, giving up");
            Ok(false)
        }
    }

    /// Send the same notification to many recipients, in fixed-size chunks
    /// with a pause between chunks. The pause is backpressure against
    /// downstream rate limits; cancellation interrupts it and skips the
    /// remaining chunks.
    pub async fn send_batch(
        &self,
        recipients: &[Recipient],
        channel: ChannelKind,
        template: &str,
        data: &serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let chunks: Vec<&[Recipient]> = recipients.chunks(self.batch_cfg.size.max(1)).collect();
        let total_chunks = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            for recipient in chunk {
                let request = NotificationRequest {
                    recipient: recipient.clone(),
                    channel,
                    template: template.to_string(),
                    data: data.clone(),
                };
                match self.send(&request).await {
                    Ok(true) => outcome.success += 1,
                    Ok(false) => outcome.failed += 1,
                    Err(e) => {
                        outcome.failed += 1;
                        tracing::error!("❌ Batch send to {} failed: {e}", recipient.id);
                    }
                }
            }

            if index + 1 < total_chunks {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::warn!("⏹️ Batch cancelled after chunk {}/{total_chunks}", index + 1);
                        break;
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(self.batch_cfg.delay_secs)) => {}
                }
            }
        }

        tracing::info!(
            "📤 Batch '{template}' via {channel}: {} ok, {} failed",
            outcome.success,
            outcome.failed
        );
        outcome
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }
}
