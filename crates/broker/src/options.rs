use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Properties of a queue created through an administrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Deliveries after which the broker dead-letters a message on its own.
    pub max_delivery_count: u32,

    /// How long a received message stays locked before it is redelivered.
    pub lock_duration: Duration,

    /// Time-to-live applied to messages that carry none.
    pub default_message_ttl: Option<Duration>,

    /// Whether expired messages are dead-lettered rather than dropped.
    pub dead_lettering_on_message_expiration: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_delivery_count: 10,
            lock_duration: Duration::from_secs(30),
            default_message_ttl: None,
            dead_lettering_on_message_expiration: true,
        }
    }
}

/// Properties of a topic and subscription created through an administrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionOptions {
    /// Deliveries after which the broker dead-letters a message on its own.
    pub max_delivery_count: u32,

    /// How long a received message stays locked before it is redelivered.
    pub lock_duration: Duration,

    /// Time-to-live applied to messages that carry none.
    pub default_message_ttl: Option<Duration>,

    /// Whether expired messages are dead-lettered rather than dropped.
    pub dead_lettering_on_message_expiration: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            max_delivery_count: 10,
            lock_duration: Duration::from_secs(30),
            default_message_ttl: Some(Duration::from_secs(14 * 24 * 60 * 60)),
            dead_lettering_on_message_expiration: true,
        }
    }
}

impl From<&SubscriptionOptions> for QueueOptions {
    fn from(options: &SubscriptionOptions) -> Self {
        Self {
            max_delivery_count: options.max_delivery_count,
            lock_duration: options.lock_duration,
            default_message_ttl: options.default_message_ttl,
            dead_lettering_on_message_expiration: options.dead_lettering_on_message_expiration,
        }
    }
}
