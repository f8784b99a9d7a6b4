//! Mapping from message types to broker destinations.

use crate::config::ConsumerConfig;
use crate::error::Error;
use crate::message::{Message, short_type_name};

use std::collections::HashMap;
use std::fmt::Debug;

use proven_broker::{ConnectionDescriptor, Destination};

/// Maps a message type to the queue or topic it is sent to.
pub trait DestinationResolver
where
    Self: Debug + Send + Sync + 'static,
{
    /// Resolves the destination for the fully-qualified type name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unroutable`] if the type has no destination.
    fn resolve(&self, type_name: &str) -> Result<Destination, Error>;
}

/// The naming convention: entity name is the type's short name, lowercased.
#[must_use]
pub fn convention_name(type_name: &str) -> String {
    short_type_name(type_name).to_lowercase()
}

/// Routes every type by naming convention on a single connection.
#[derive(Clone, Debug)]
pub struct ConventionResolver {
    connection: ConnectionDescriptor,
}

impl ConventionResolver {
    /// Creates a resolver for the given connection.
    #[must_use]
    pub const fn new(connection: ConnectionDescriptor) -> Self {
        Self { connection }
    }
}

impl DestinationResolver for ConventionResolver {
    fn resolve(&self, type_name: &str) -> Result<Destination, Error> {
        Ok(Destination::queue(
            convention_name(type_name),
            self.connection.clone(),
        ))
    }
}

/// Explicit routes registered per message type.
#[derive(Clone, Debug, Default)]
pub struct DestinationMap {
    routes: HashMap<String, Destination>,
}

impl DestinationMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `M` to `destination`, replacing any earlier route.
    #[must_use]
    pub fn route<M: Message>(mut self, destination: Destination) -> Self {
        self.routes.insert(M::type_name().to_string(), destination);
        self
    }
}

impl DestinationResolver for DestinationMap {
    fn resolve(&self, type_name: &str) -> Result<Destination, Error> {
        self.routes
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::Unroutable(type_name.to_string()))
    }
}

/// How a consumer names the entity it reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestinationStrategy {
    /// Use this entity name.
    Explicit(String),

    /// Derive the entity name from the message type.
    Convention,
}

impl DestinationStrategy {
    /// Picks the explicit name when the configuration sets one.
    #[must_use]
    pub fn from_config(config: &ConsumerConfig) -> Self {
        match config.destination_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Self::Explicit(name.to_string()),
            _ => Self::Convention,
        }
    }

    /// Entity name for the given type.
    #[must_use]
    pub fn entity_name(&self, type_name: &str) -> String {
        match self {
            Self::Explicit(name) => name.clone(),
            Self::Convention => convention_name(type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    fn connection() -> ConnectionDescriptor {
        ConnectionDescriptor::new("memory://resolver")
    }

    #[test]
    fn test_convention_lowercases_short_name() {
        let resolver = ConventionResolver::new(connection());
        let destination = resolver.resolve("shop::orders::AddOrder").unwrap();

        assert_eq!(destination.name(), "addorder");
        assert!(!destination.is_subscription());
    }

    #[test]
    fn test_map_rejects_unknown_types() {
        let resolver = DestinationMap::new();

        assert_matches!(
            resolver.resolve("shop::orders::AddOrder"),
            Err(Error::Unroutable(name)) if name == "shop::orders::AddOrder"
        );
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = ConsumerConfig::new(connection(), "orders-service");
        assert_eq!(
            DestinationStrategy::from_config(&config),
            DestinationStrategy::Convention
        );
        assert_eq!(
            DestinationStrategy::from_config(&config).entity_name("shop::AddOrder"),
            "addorder"
        );

        config.destination_name = Some("  ".to_string());
        assert_eq!(
            DestinationStrategy::from_config(&config),
            DestinationStrategy::Convention
        );

        config.destination_name = Some("orders-in".to_string());
        assert_eq!(
            DestinationStrategy::from_config(&config).entity_name("shop::AddOrder"),
            "orders-in"
        );
    }
}
