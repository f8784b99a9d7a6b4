//! Handlers and the registry consumers resolve them from.

use crate::error::{BoxError, Error, HandlerPanic};
use crate::message::{Command, Event, Message};

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use proven_broker::Destination;
use tokio_util::sync::CancellationToken;

/// Delivery metadata handed to handlers.
#[derive(Clone, Debug)]
pub struct DeliveryContext {
    /// Broker message id.
    pub message_id: String,

    /// Correlation id, empty when the message carries none.
    pub correlation_id: String,

    /// Times the message has been delivered, this delivery included.
    pub delivery_count: u32,

    /// Where the message was received from.
    pub destination: Destination,

    /// Cancelled when the consumer stops. Handlers may observe it; deliveries
    /// are never aborted.
    pub cancellation: CancellationToken,
}

/// Handles a command. Exactly one handler is registered per command type.
#[async_trait]
pub trait CommandHandler<C>
where
    Self: Send + Sync + 'static,
    C: Command,
{
    /// Handles the command. An error abandons or dead-letters the delivery.
    async fn handle(&self, command: &C, context: &DeliveryContext) -> Result<(), BoxError>;
}

/// Handles an event. Any number of handlers may be registered per event type.
#[async_trait]
pub trait EventHandler<E>
where
    Self: Send + Sync + 'static,
    E: Event,
{
    /// Handles the event. An error abandons or dead-letters the delivery.
    async fn handle(&self, event: &E, context: &DeliveryContext) -> Result<(), BoxError>;
}

#[async_trait]
trait ErasedHandler<M>
where
    Self: Send + Sync + 'static,
    M: Message,
{
    async fn call(&self, message: &M, context: &DeliveryContext) -> Result<(), BoxError>;
}

struct AsCommand<H>(H);

#[async_trait]
impl<C, H> ErasedHandler<C> for AsCommand<H>
where
    C: Command,
    H: CommandHandler<C>,
{
    async fn call(&self, message: &C, context: &DeliveryContext) -> Result<(), BoxError> {
        self.0.handle(message, context).await
    }
}

struct AsEvent<H>(H);

#[async_trait]
impl<E, H> ErasedHandler<E> for AsEvent<H>
where
    E: Event,
    H: EventHandler<E>,
{
    async fn call(&self, message: &E, context: &DeliveryContext) -> Result<(), BoxError> {
        self.0.handle(message, context).await
    }
}

type Registration = Box<dyn Any + Send + Sync>;

/// Handlers registered by message type tag.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<&'static str, Vec<Registration>>,
    events: HashMap<&'static str, Vec<Registration>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command handler.
    pub fn register_command<C, H>(&mut self, handler: H) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let handler: Arc<dyn ErasedHandler<C>> = Arc::new(AsCommand(handler));
        self.commands
            .entry(C::type_name())
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Registers an event handler. Handlers run in registration order.
    pub fn register_event<E, H>(&mut self, handler: H) -> &mut Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        let handler: Arc<dyn ErasedHandler<E>> = Arc::new(AsEvent(handler));
        self.events
            .entry(E::type_name())
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Resolves the single handler for `C`.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler or more than one is registered.
    pub fn command_dispatch<C: Command>(&self) -> Result<Dispatch<C>, Error> {
        let handlers = Self::collect::<C>(&self.commands);

        match handlers.len() {
            0 => Err(Error::MissingCommandHandler(C::type_name().to_string())),
            1 => Ok(Dispatch { handlers }),
            _ => Err(Error::DuplicateCommandHandler(C::type_name().to_string())),
        }
    }

    /// Resolves every handler for `E`, possibly none.
    #[must_use]
    pub fn event_dispatch<E: Event>(&self) -> Dispatch<E> {
        Dispatch {
            handlers: Self::collect::<E>(&self.events),
        }
    }

    fn collect<M: Message>(
        registrations: &HashMap<&'static str, Vec<Registration>>,
    ) -> Vec<Arc<dyn ErasedHandler<M>>> {
        registrations
            .get(M::type_name())
            .into_iter()
            .flatten()
            .filter_map(|registration| registration.downcast_ref::<Arc<dyn ErasedHandler<M>>>())
            .cloned()
            .collect()
    }
}

impl Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handlers for one message type, resolved once.
pub struct Dispatch<M>
where
    M: Message,
{
    handlers: Vec<Arc<dyn ErasedHandler<M>>>,
}

impl<M> Dispatch<M>
where
    M: Message,
{
    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether there are no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handlers in order, stopping at the first failure.
    ///
    /// A panicking handler counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub async fn invoke(&self, message: &M, context: &DeliveryContext) -> Result<(), BoxError> {
        for handler in &self.handlers {
            AssertUnwindSafe(handler.call(message, context))
                .catch_unwind()
                .await
                .map_err(|panic| HandlerPanic(panic_message(panic.as_ref())))??;
        }

        Ok(())
    }
}

impl<M> Debug for Dispatch<M>
where
    M: Message,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("message", &M::type_name())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
