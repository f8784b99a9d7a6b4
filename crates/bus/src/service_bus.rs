use crate::error::Error;
use crate::message::{Command, Event, Message};
use crate::sender_pool::SenderPool;
use crate::serializer::MessageSerializer;

use std::fmt::{self, Debug};
use std::sync::Arc;

use proven_broker::{Broker, Envelope, SenderHandle};
use tracing::info;

/// Application property holding a command's fully-qualified type name.
pub const COMMAND_NAME_PROPERTY: &str = "CommandName";

/// Application property holding an event's fully-qualified type name.
pub const EVENT_NAME_PROPERTY: &str = "EventName";

/// Sends commands and publishes events.
pub struct ServiceBus<B>
where
    B: Broker,
{
    pool: Arc<SenderPool<B>>,
    serializer: MessageSerializer,
}

impl<B> ServiceBus<B>
where
    B: Broker,
{
    /// Creates a bus sending through the given pool.
    pub const fn new(pool: Arc<SenderPool<B>>, serializer: MessageSerializer) -> Self {
        Self { pool, serializer }
    }

    /// The pool senders come from.
    #[must_use]
    pub const fn sender_pool(&self) -> &Arc<SenderPool<B>> {
        &self.pool
    }

    /// Sends a command to its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is unroutable, cannot be serialized,
    /// or the broker rejects it. Nothing is sent when serialization fails.
    pub async fn send<C: Command>(&self, command: &C) -> Result<(), Error> {
        let destination = self.pool.resolve::<C>()?;
        let envelope = self.envelope(command, COMMAND_NAME_PROPERTY)?;

        let sender = self.pool.acquire(&destination).await?;
        info!(
            "Send command '{}' to {}",
            command.message_id(),
            sender.destination()
        );

        sender.send(envelope).await.map_err(Error::broker)
    }

    /// Publishes an event to its topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is unroutable, cannot be serialized,
    /// or the broker rejects it. Nothing is sent when serialization fails.
    pub async fn publish<E: Event>(&self, event: &E) -> Result<(), Error> {
        let destination = self.pool.resolve::<E>()?;
        let envelope = self.envelope(event, EVENT_NAME_PROPERTY)?;

        let sender = self.pool.acquire(&destination).await?;
        info!(
            "Publishing event '{}' to {}",
            event.message_id(),
            sender.destination()
        );

        sender.send(envelope).await.map_err(Error::broker)
    }

    fn envelope<M: Message>(&self, message: &M, name_property: &str) -> Result<Envelope, Error> {
        let body = self.serializer.serialize(message)?;
        let headers = message.headers();

        Ok(Envelope::new(headers.message_id.to_string(), body)
            .with_correlation_id(headers.correlation_id().unwrap_or_default())
            .with_content_type(self.serializer.content_type())
            .with_property(name_property, M::type_name()))
    }
}

impl<B> Clone for ServiceBus<B>
where
    B: Broker,
{
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            serializer: self.serializer,
        }
    }
}

impl<B> Debug for ServiceBus<B>
where
    B: Broker,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBus")
            .field("pool", &self.pool)
            .field("serializer", &self.serializer)
            .finish()
    }
}
