use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};

/// Opaque description of how to reach a broker namespace.
///
/// Connection strings usually carry credentials, so `Display` and `Debug` only
/// ever show the namespace.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    /// Creates a new connection descriptor.
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// Returns the raw descriptor.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the namespace part of the descriptor.
    ///
    /// For `Endpoint=sb://host/;Key=...` style strings this is `host`,
    /// for `scheme://host/...` URLs it is `host`, otherwise the whole string.
    #[must_use]
    pub fn namespace(&self) -> &str {
        let raw = self.0.as_str();

        let endpoint = raw
            .split(';')
            .find_map(|part| {
                let (key, value) = part.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("endpoint")
                    .then_some(value.trim())
            })
            .unwrap_or(raw);

        endpoint
            .split_once("://")
            .map_or(endpoint, |(_, rest)| rest)
            .trim_end_matches('/')
    }
}

impl Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.namespace())
            .finish()
    }
}

impl Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl From<&str> for ConnectionDescriptor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConnectionDescriptor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Address of a queue, a topic, or a topic subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    name: String,
    subscription: Option<String>,
    connection: ConnectionDescriptor,
}

impl Destination {
    /// A queue, or the send side of a topic.
    pub fn queue(name: impl Into<String>, connection: ConnectionDescriptor) -> Self {
        Self {
            name: name.into(),
            subscription: None,
            connection,
        }
    }

    /// A subscription on a topic.
    pub fn subscription(
        topic: impl Into<String>,
        subscription: impl Into<String>,
        connection: ConnectionDescriptor,
    ) -> Self {
        Self {
            name: topic.into(),
            subscription: Some(subscription.into()),
            connection,
        }
    }

    /// Returns the same topic with the given subscription.
    #[must_use]
    pub fn with_subscription(self, subscription: impl Into<String>) -> Self {
        Self {
            subscription: Some(subscription.into()),
            ..self
        }
    }

    /// Returns the queue or topic this destination sends to.
    #[must_use]
    pub fn without_subscription(&self) -> Self {
        Self {
            name: self.name.clone(),
            subscription: None,
            connection: self.connection.clone(),
        }
    }

    /// Queue or topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscription name, for topic subscriptions.
    #[must_use]
    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription.as_deref()
    }

    /// Connection to the namespace holding the entity.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// Whether this destination names a topic subscription.
    #[must_use]
    pub const fn is_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    /// Path of the entity inside its namespace.
    #[must_use]
    pub fn entity_path(&self) -> String {
        match &self.subscription {
            Some(subscription) => format!("{}/subscriptions/{}", self.name, subscription),
            None => self.name.clone(),
        }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection, self.entity_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_from_connection_string() {
        let connection = ConnectionDescriptor::new(
            "Endpoint=sb://orders.servicebus.windows.net/;SharedAccessKeyName=Root;SharedAccessKey=secret=",
        );

        assert_eq!(connection.namespace(), "orders.servicebus.windows.net");
        assert!(!format!("{connection:?}").contains("secret"));
        assert!(!connection.to_string().contains("secret"));
    }

    #[test]
    fn test_namespace_from_url_and_plain_name() {
        assert_eq!(ConnectionDescriptor::new("memory://local/").namespace(), "local");
        assert_eq!(ConnectionDescriptor::new("local").namespace(), "local");
    }

    #[test]
    fn test_entity_paths() {
        let connection = ConnectionDescriptor::new("memory://local");
        let queue = Destination::queue("addorder", connection.clone());
        let subscription = Destination::subscription("ordercreated", "billing", connection);

        assert_eq!(queue.entity_path(), "addorder");
        assert_eq!(subscription.entity_path(), "ordercreated/subscriptions/billing");
        assert_eq!(subscription.to_string(), "local/ordercreated/subscriptions/billing");
        assert!(!queue.is_subscription());
        assert_eq!(subscription.without_subscription().entity_path(), "ordercreated");
    }

    #[test]
    fn test_destination_deserializes_from_config() {
        let destination: Destination = serde_json::from_str(
            r#"{"name":"ordercreated","subscription":"billing","connection":"memory://local"}"#,
        )
        .unwrap();

        assert_eq!(destination.subscription_name(), Some("billing"));
        assert_eq!(destination.connection().namespace(), "local");
    }
}
