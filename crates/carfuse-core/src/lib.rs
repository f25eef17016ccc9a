//! # CarFuse Core
//!
//! Shared foundation for the CarFuse back-office subsystems: configuration,
//! the error taxonomy, the notification data model, and the collaborator
//! traits (template renderer, remote storage, shell executor, record store)
//! that the queue, notify, maintenance, and scheduler crates build on.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::CarFuseConfig;
pub use error::{BackupStage, CarFuseError, Result};
pub use types::{ChannelKind, NotificationRequest, Recipient};
