use std::collections::HashMap;
use std::fmt::{self, Display};
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

/// Application property carrying the reason a message was dead-lettered.
pub const DEAD_LETTER_REASON_PROPERTY: &str = "DeadLetterReason";

/// Application property carrying the dead-letter error description.
pub const DEAD_LETTER_ERROR_DESCRIPTION_PROPERTY: &str = "DeadLetterErrorDescription";

/// Dead-letter reason used when the broker's own delivery limit is exceeded.
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Dead-letter reason used when a message outlives its time-to-live.
pub const TTL_EXPIRED: &str = "TTLExpiredException";

/// The wire representation of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Unique message id.
    pub message_id: String,

    /// Correlation id, empty when the message carries none.
    pub correlation_id: String,

    /// MIME type of the body.
    pub content_type: Option<String>,

    /// Application properties (type names, dead-letter reasons, ...).
    pub application_properties: HashMap<String, String>,

    /// Opaque serialized body.
    pub body: Bytes,

    /// Overrides the entity's default time-to-live.
    pub time_to_live: Option<Duration>,
}

impl Envelope {
    /// Creates an envelope with the given id and body.
    pub fn new(message_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds an application property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    /// Sets the time-to-live.
    #[must_use]
    pub const fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Looks up an application property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.application_properties.get(key).map(String::as_str)
    }
}

/// Identifies the lock a receiver holds on a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    /// Creates a fresh lock token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locked message handed out by a receiver.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    /// The message as sent.
    pub envelope: Envelope,

    /// Number of times the message has been delivered, this delivery included.
    pub delivery_count: u32,

    /// Broker-assigned position in the entity.
    pub sequence_number: u64,

    /// Lock held by this delivery.
    pub lock_token: LockToken,
}

impl ReceivedMessage {
    /// Shortcut for the envelope's message id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }
}
