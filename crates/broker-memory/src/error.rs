use proven_broker::BrokerError;
use thiserror::Error;

/// Errors that can occur in the memory broker.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No namespace is registered for the connection descriptor.
    #[error("No namespace for connection {0}")]
    NamespaceNotFound(String),

    /// Queue, topic or subscription does not exist.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// A queue and a topic cannot share a name.
    #[error("Entity {0} already exists with a different kind")]
    EntityConflict(String),

    /// The destination cannot be used for the requested operation.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The sender has been closed.
    #[error("Sender for {0} is closed")]
    SenderClosed(String),

    /// The lock on the message expired or the message was already settled.
    #[error("Lock lost for message {0}")]
    LockLost(String),

    /// Simulated loss of the broker connection.
    #[error("Connection to {0} lost")]
    ConnectionLost(String),
}

impl BrokerError for Error {}
