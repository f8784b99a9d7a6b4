use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Property-bag key holding the correlation id. Matched case-insensitively.
pub const CORRELATION_ID_KEY: &str = "CorrelationId";

/// Identity and metadata carried by every message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Unique message id.
    pub message_id: Uuid,

    /// Free-form string properties.
    #[serde(default)]
    pub user_properties: HashMap<String, String>,
}

impl MessageHeaders {
    /// Headers with a fresh message id and no properties.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            user_properties: HashMap::new(),
        }
    }

    /// Sets the correlation id property.
    #[must_use]
    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with_property(CORRELATION_ID_KEY, correlation_id)
    }

    /// Adds a user property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    /// The correlation id, looked up ignoring the key's case.
    ///
    /// The exact-case key wins. Among other spellings the lexicographically
    /// smallest key is used.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        if let Some(value) = self.user_properties.get(CORRELATION_ID_KEY) {
            return Some(value);
        }

        self.user_properties
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(CORRELATION_ID_KEY))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, value)| value.as_str())
    }
}

impl Default for MessageHeaders {
    fn default() -> Self {
        Self::new()
    }
}

/// A domain message that can travel over the bus.
pub trait Message
where
    Self: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// The message's headers.
    fn headers(&self) -> &MessageHeaders;

    /// Stable, fully-qualified type tag used for dispatch and envelope metadata.
    ///
    /// The default is [`std::any::type_name`], whose output may change between
    /// compiler versions. It also names queues and topics and travels on the
    /// wire, so override it with a fixed string when producers and consumers
    /// are built with different toolchains.
    #[must_use]
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Type name without its module path.
    #[must_use]
    fn short_name() -> &'static str {
        short_type_name(Self::type_name())
    }

    /// Shortcut for the header's message id.
    fn message_id(&self) -> Uuid {
        self.headers().message_id
    }
}

/// A message with exactly one handler, delivered through a queue.
pub trait Command: Message {}

/// A message with any number of handlers, delivered through a topic.
pub trait Event: Message {}

pub(crate) fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        headers: MessageHeaders,
    }

    impl Message for Ping {
        fn headers(&self) -> &MessageHeaders {
            &self.headers
        }
    }

    #[test]
    fn test_correlation_id_is_case_insensitive() {
        let headers = MessageHeaders::new().with_property("correlationid", "c-42");

        assert_eq!(headers.correlation_id(), Some("c-42"));
        assert_eq!(MessageHeaders::new().correlation_id(), None);
    }

    #[test]
    fn test_exact_correlation_key_wins_over_other_spellings() {
        let headers = MessageHeaders::new()
            .with_property("correlationid", "lower")
            .with_property("CORRELATIONID", "upper")
            .with_property(CORRELATION_ID_KEY, "exact");

        assert_eq!(headers.correlation_id(), Some("exact"));

        let headers = MessageHeaders::new()
            .with_property("correlationid", "lower")
            .with_property("CORRELATIONID", "upper");

        assert_eq!(headers.correlation_id(), Some("upper"));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Renamed {
        headers: MessageHeaders,
    }

    impl Message for Renamed {
        fn headers(&self) -> &MessageHeaders {
            &self.headers
        }

        fn type_name() -> &'static str {
            "orders.Renamed"
        }
    }

    #[test]
    fn test_type_name_can_be_pinned() {
        assert_eq!(Renamed::type_name(), "orders.Renamed");
        assert_eq!(Renamed::short_name(), "orders.Renamed");
    }

    #[test]
    fn test_type_names() {
        assert!(Ping::type_name().ends_with("::Ping"));
        assert_eq!(Ping::short_name(), "Ping");
        assert_eq!(short_type_name("orders::Wrapper<orders::Inner>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
