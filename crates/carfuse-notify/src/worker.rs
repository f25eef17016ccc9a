//! Bridge between the durable queue and the dispatcher.
//!
//! Deferred notifications persisted by the retry path come back through
//! here. The worker only renders and delivers; attempt counting and the
//! max-attempts drop belong to the queue processor.

use std::sync::Arc;

use async_trait::async_trait;

use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::types::NotificationRequest;
use carfuse_queue::{QueueItem, QueueWorker};

use crate::dispatcher::Dispatcher;

pub struct QueuedNotificationWorker {
    dispatcher: Arc<Dispatcher>,
}

impl QueuedNotificationWorker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl QueueWorker for QueuedNotificationWorker {
    async fn handle(&self, item: &QueueItem) -> Result<()> {
        let request: NotificationRequest = item
            .payload
            .get("request")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CarFuseError::QueuePersistence(format!("decode request: {e}")))?
            .ok_or_else(|| {
                CarFuseError::QueuePersistence(format!("item {} has no request payload", item.id))
            })?;

        // An opt-out while the item sat in the queue removes it quietly.
        self.dispatcher.deliver_now(&request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use carfuse_core::config::{BatchConfig, RetryConfig};
    use carfuse_core::traits::TemplateRenderer;
    use carfuse_core::types::{ChannelKind, Recipient};
    use carfuse_queue::{QueueProcessor, QueueStore};

    use crate::transport::Transport;

    struct FixedTemplates;

    impl TemplateRenderer for FixedTemplates {
        fn render(
            &self,
            _template: &str,
            _locale: &str,
            _data: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<String> {
            Ok("body".into())
        }
    }

    struct MockTransport {
        fail: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn channel(&self) -> ChannelKind {
            ChannelKind::Sms
        }

        async fn deliver(&self, _r: &Recipient, _s: &str, _c: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(CarFuseError::Delivery("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn setup(name: &str) -> (Arc<Dispatcher>, Arc<AtomicBool>, PathBuf) {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        let fail = Arc::new(AtomicBool::new(false));
        let mut dispatcher = Dispatcher::new(
            Box::new(FixedTemplates),
            QueueStore::new(&dir),
            RetryConfig {
                max_attempts: 3,
                interval_secs: 0,
            },
            BatchConfig::default(),
        );
        dispatcher.register(Box::new(MockTransport {
            fail: fail.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        (Arc::new(dispatcher), fail, dir)
    }

    #[tokio::test]
    async fn test_requeued_failure_is_replayed_and_removed_on_success() {
        let (dispatcher, fail, dir) = setup("carfuse-test-worker-replay");

        // First delivery fails and lands in the queue (interval 0 makes it
        // immediately due).
        fail.store(true, Ordering::SeqCst);
        let mut recipient = Recipient::new("u-1");
        recipient.phone = Some("+48123123123".into());
        let request =
            NotificationRequest::new(recipient, ChannelKind::Sms, "pickup_reminder");
        assert!(dispatcher.send(&request).await.unwrap());
        assert_eq!(dispatcher.queue().snapshot().len(), 1);

        // The transport recovers; one processing pass drains the queue.
        fail.store(false, Ordering::SeqCst);
        let processor = QueueProcessor::new(
            QueueStore::new(&dir),
            QueuedNotificationWorker::new(dispatcher.clone()),
            3,
        );
        let stats = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert!(dispatcher.queue().snapshot().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_malformed_item_fails_the_attempt() {
        let (dispatcher, _fail, dir) = setup("carfuse-test-worker-bad");
        let worker = QueuedNotificationWorker::new(dispatcher);

        let mut payload = serde_json::Map::new();
        payload.insert("type".into(), "notification".into());
        let store = QueueStore::new(&dir);
        let item = store.push(payload).unwrap();

        assert!(worker.handle(&item).await.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
