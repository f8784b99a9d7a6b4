//! Abstract interface for peek-lock message brokers.
//!
//! This crate provides a broker-agnostic interface for queues, topics and
//! subscriptions. Specific broker implementations (in-memory, cloud SDKs, etc.)
//! are provided in separate crates.
//!
//! Brokers handle:
//! - Entity management (create-if-missing queues, topics and subscriptions)
//! - Outbound senders bound to a single destination
//! - Peek-lock receivers with delivery counters
//! - Settlement (complete, abandon, dead-letter)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod destination;
mod envelope;
mod options;

pub use destination::{ConnectionDescriptor, Destination};
pub use envelope::{
    DEAD_LETTER_ERROR_DESCRIPTION_PROPERTY, DEAD_LETTER_REASON_PROPERTY, Envelope, LockToken,
    MAX_DELIVERY_COUNT_EXCEEDED, ReceivedMessage, TTL_EXPIRED,
};
pub use options::{QueueOptions, SubscriptionOptions};

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;

/// Marker trait for broker errors
pub trait BrokerError: Debug + Error + Send + Sync + 'static {}

/// An outbound endpoint bound to a single queue or topic.
#[async_trait]
pub trait SenderHandle
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the sender.
    type Error: BrokerError;

    /// The destination this sender publishes to.
    fn destination(&self) -> &Destination;

    /// Whether the underlying connection has been closed.
    ///
    /// A closed handle never reopens; callers must create a new one.
    fn is_closed(&self) -> bool;

    /// Sends an envelope to the destination.
    async fn send(&self, envelope: Envelope) -> Result<(), Self::Error>;

    /// Closes the sender.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// A peek-lock receiver for a queue or a topic subscription.
///
/// Received messages stay locked until settled with exactly one of
/// [`complete`](Receiver::complete), [`abandon`](Receiver::abandon) or
/// [`dead_letter`](Receiver::dead_letter). A lock that is never settled expires
/// and the message becomes available again with an incremented delivery count.
#[async_trait]
pub trait Receiver
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the receiver.
    type Error: BrokerError;

    /// The destination this receiver pulls from.
    fn destination(&self) -> &Destination;

    /// Waits a bounded amount of time for the next message.
    ///
    /// Returns `Ok(None)` if nothing arrived within the wait. Must be cancel
    /// safe: dropping the future before it resolves locks nothing.
    async fn receive(&self) -> Result<Option<ReceivedMessage>, Self::Error>;

    /// Permanently removes the message.
    async fn complete(&self, message: &ReceivedMessage) -> Result<(), Self::Error>;

    /// Releases the lock so the message is immediately eligible for redelivery.
    async fn abandon(&self, message: &ReceivedMessage) -> Result<(), Self::Error>;

    /// Moves the message to the dead-letter sub-queue.
    async fn dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), Self::Error>;
}

/// A connection to a broker that hands out senders and receivers.
#[async_trait]
pub trait Broker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: BrokerError;

    /// The sender type handed out by the broker.
    type Sender: SenderHandle;

    /// The receiver type handed out by the broker.
    type Receiver: Receiver;

    /// Creates a sender for a queue or topic.
    async fn create_sender(&self, destination: &Destination) -> Result<Self::Sender, Self::Error>;

    /// Creates a receiver for a queue or topic subscription.
    async fn create_receiver(
        &self,
        destination: &Destination,
    ) -> Result<Self::Receiver, Self::Error>;
}

/// Idempotent entity management.
///
/// These calls belong at construction time, never on the hot path.
#[async_trait]
pub trait Administrator
where
    Self: Send + Sync + 'static,
{
    /// The error type for the administrator.
    type Error: BrokerError;

    /// Creates the queue named by `destination` unless it already exists.
    async fn create_queue_if_not_exists(
        &self,
        destination: &Destination,
        options: &QueueOptions,
    ) -> Result<(), Self::Error>;

    /// Creates the topic named by `destination` unless it already exists, and
    /// the subscription too when the destination names one.
    async fn create_topic_if_not_exists(
        &self,
        destination: &Destination,
        options: &SubscriptionOptions,
    ) -> Result<(), Self::Error>;
}
