use proven_broker::BrokerError;
use thiserror::Error;

/// Boxed error used where the concrete type belongs to a broker or a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while converting messages to and from bytes.
#[derive(Debug, Error)]
pub enum SerializerError {
    /// The message could not be encoded.
    #[error("Failed to serialize message: {0}")]
    Serialize(String),

    /// The payload could not be decoded into the requested type.
    #[error("Failed to deserialize message: {0}")]
    Deserialize(String),
}

/// A handler panicked while processing a delivery.
#[derive(Debug, Error)]
#[error("Handler panicked: {0}")]
pub struct HandlerPanic(pub String);

/// Errors that can occur in the bus.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker rejected an operation.
    #[error("Broker error: {0}")]
    Broker(#[source] BoxError),

    /// More than one command handler is registered for a command type.
    #[error("More than one command handler registered for {0}")]
    DuplicateCommandHandler(String),

    /// Invalid consumer configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The destination cannot be used.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// No command handler is registered for a command type.
    #[error("No command handler registered for {0}")]
    MissingCommandHandler(String),

    /// Serialization error.
    #[error(transparent)]
    Serializer(#[from] SerializerError),

    /// The processor was stopped and cannot be restarted.
    #[error("Processor has been stopped")]
    Stopped,

    /// No destination is registered for a message type.
    #[error("No destination registered for message type {0}")]
    Unroutable(String),
}

impl Error {
    pub(crate) fn broker<E: BrokerError>(error: E) -> Self {
        Self::Broker(Box::new(error))
    }
}
