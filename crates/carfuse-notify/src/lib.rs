//! # CarFuse Notify
//!
//! Notification delivery: a transport registry polymorphic over
//! {email, sms, push}, locale-aware template rendering, per-key retry
//! tracking, and chunked batch dispatch with inter-chunk backpressure.
//!
//! Failed deliveries are requeued as deferred queue items; the queue
//! processor replays them on later runs via [`worker::QueuedNotificationWorker`].

pub mod dispatcher;
pub mod retry;
pub mod templates;
pub mod transport;
pub mod worker;

pub use dispatcher::{BatchOutcome, Dispatcher};
pub use retry::{InMemoryRetryStore, RetryKey, RetryStore, RetryTracker};
pub use templates::FileTemplates;
pub use transport::{PushTransport, SmsTransport, SmtpMailer, Transport};
pub use worker::QueuedNotificationWorker;
