//! Shared data model for notification delivery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A notification transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
}

impl ChannelKind {
    /// String tag used in config, queue payloads, and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Push => "push",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = crate::error::CarFuseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            "push" => Ok(ChannelKind::Push),
            other => Err(crate::error::CarFuseError::UnsupportedChannel(
                other.to_string(),
            )),
        }
    }
}

/// A notification recipient, with per-channel opt-in preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    /// Stable user reference.
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Per-channel opt-in flags. A channel absent from the map is opted in.
    #[serde(default)]
    pub preferences: HashMap<ChannelKind, bool>,
}

fn default_locale() -> String {
    "en".into()
}

impl Recipient {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: None,
            phone: None,
            device_token: None,
            locale: default_locale(),
            preferences: HashMap::new(),
        }
    }

    /// Whether this recipient accepts delivery on the given channel.
    /// Unset preference defaults to true.
    pub fn accepts(&self, channel: ChannelKind) -> bool {
        self.preferences.get(&channel).copied().unwrap_or(true)
    }
}

/// A single delivery request: transient, consumed by the dispatcher.
/// Only persisted (as a queue item) if it fails and is accepted for retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient: Recipient,
    pub channel: ChannelKind,
    pub template: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl NotificationRequest {
    pub fn new(recipient: Recipient, channel: ChannelKind, template: &str) -> Self {
        Self {
            recipient,
            channel,
            template: template.to_string(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        for kind in [ChannelKind::Email, ChannelKind::Sms, ChannelKind::Push] {
            let parsed: ChannelKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("pigeon".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn test_preference_defaults_to_opted_in() {
        let mut recipient = Recipient::new("u-1");
        assert!(recipient.accepts(ChannelKind::Email));

        recipient.preferences.insert(ChannelKind::Email, false);
        assert!(!recipient.accepts(ChannelKind::Email));
        assert!(recipient.accepts(ChannelKind::Sms));
    }
}
