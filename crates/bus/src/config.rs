//! Consumer configuration

use crate::error::Error;
use crate::serializer::SerializerConfig;

use std::time::Duration;

use proven_broker::{ConnectionDescriptor, QueueOptions, SubscriptionOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Default number of deliveries processed at once.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 1;

/// Default number of failed deliveries tolerated before dead-lettering.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Configuration for one consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Connection to the broker namespace.
    pub connection: ConnectionDescriptor,

    /// Explicit entity name. The naming convention applies when unset.
    #[serde(default)]
    pub destination_name: Option<String>,

    /// Subscription name for event consumers, client identity for command consumers.
    #[serde(default)]
    pub subscription_or_client_id: String,

    /// Deliveries processed concurrently.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Failed deliveries tolerated before a message is dead-lettered.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Pause after a broker fault before pulling again.
    #[serde(default = "default_fault_backoff")]
    pub fault_backoff: Duration,

    /// Body format.
    #[serde(default)]
    pub serializer: SerializerConfig,

    /// Properties used when the consumer creates its queue.
    #[serde(default)]
    pub queue_options: QueueOptions,

    /// Properties used when the consumer creates its topic subscription.
    #[serde(default)]
    pub subscription_options: SubscriptionOptions,
}

const fn default_max_concurrent_calls() -> usize {
    DEFAULT_MAX_CONCURRENT_CALLS
}

const fn default_max_delivery_attempts() -> u32 {
    DEFAULT_MAX_DELIVERY_ATTEMPTS
}

const fn default_fault_backoff() -> Duration {
    Duration::from_secs(1)
}

impl ConsumerConfig {
    /// Configuration with defaults for everything but the connection and identity.
    pub fn new(
        connection: ConnectionDescriptor,
        subscription_or_client_id: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            destination_name: None,
            subscription_or_client_id: subscription_or_client_id.into(),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            fault_backoff: default_fault_backoff(),
            serializer: SerializerConfig::default(),
            queue_options: QueueOptions::default(),
            subscription_options: SubscriptionOptions::default(),
        }
    }

    /// Sets an explicit entity name.
    #[must_use]
    pub fn with_destination_name(mut self, destination_name: impl Into<String>) -> Self {
        self.destination_name = Some(destination_name.into());
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_calls(mut self, max_concurrent_calls: usize) -> Self {
        self.max_concurrent_calls = max_concurrent_calls;
        self
    }

    /// Sets the retry threshold.
    #[must_use]
    pub const fn with_max_delivery_attempts(mut self, max_delivery_attempts: u32) -> Self {
        self.max_delivery_attempts = max_delivery_attempts;
        self
    }

    /// Sets the pause after a broker fault.
    #[must_use]
    pub const fn with_fault_backoff(mut self, fault_backoff: Duration) -> Self {
        self.fault_backoff = fault_backoff;
        self
    }

    /// Sets the body format.
    #[must_use]
    pub const fn with_serializer(mut self, serializer: SerializerConfig) -> Self {
        self.serializer = serializer;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the concurrency limit is zero or
    /// larger than a semaphore can hold.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_calls == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_calls must be at least 1".to_string(),
            ));
        }

        if self.max_concurrent_calls > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidConfig(format!(
                "max_concurrent_calls must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(())
    }
}
