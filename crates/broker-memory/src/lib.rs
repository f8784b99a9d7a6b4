//! In-memory implementation of the broker interface for testing and development.
//!
//! Emulates peek-lock brokers closely enough to exercise delivery guarantees:
//! delivery counters, lock expiry, abandon, dead-letter sub-queues, message
//! time-to-live and topic fan-out to subscriptions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod store;

pub use error::Error;

use store::MessageStore;

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use proven_broker::{
    Administrator, Broker, ConnectionDescriptor, Destination, Envelope, QueueOptions,
    ReceivedMessage, Receiver, SenderHandle, SubscriptionOptions,
};
use tokio::time::Instant;
use tracing::{debug, info};

/// Options for the memory broker.
#[derive(Clone, Debug)]
pub struct MemoryBrokerOptions {
    /// How long `receive` waits for a message before returning `None`.
    pub receive_wait: Duration,
}

impl Default for MemoryBrokerOptions {
    fn default() -> Self {
        Self {
            receive_wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
struct Topic {
    subscriptions: DashMap<String, Arc<MessageStore>>,
}

#[derive(Debug, Default)]
struct Namespace {
    queues: DashMap<String, Arc<MessageStore>>,
    topics: DashMap<String, Arc<Topic>>,
}

/// In-memory broker.
///
/// Each connection descriptor selects its own namespace. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    namespaces: Arc<DashMap<ConnectionDescriptor, Arc<Namespace>>>,
    options: MemoryBrokerOptions,
    senders_created: Arc<AtomicUsize>,
}

impl MemoryBroker {
    /// Creates a new broker with the given options.
    #[must_use]
    pub fn new(options: MemoryBrokerOptions) -> Self {
        Self {
            namespaces: Arc::new(DashMap::new()),
            options,
            senders_created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of senders created over the broker's lifetime.
    #[must_use]
    pub fn senders_created(&self) -> usize {
        self.senders_created.load(Ordering::SeqCst)
    }

    /// Number of active (available or locked) messages in a queue or subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn message_count(&self, destination: &Destination) -> Result<usize, Error> {
        Ok(self.store(destination)?.message_count())
    }

    /// Messages moved to the dead-letter sub-queue of a queue or subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn dead_letters(&self, destination: &Destination) -> Result<Vec<Envelope>, Error> {
        Ok(self.store(destination)?.dead_letters())
    }

    /// Makes the next `count` receive calls on the entity fail as if the
    /// connection dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn inject_receive_fault(&self, destination: &Destination, count: usize) -> Result<(), Error> {
        self.store(destination)?.inject_faults(count);
        Ok(())
    }

    fn namespace(&self, connection: &ConnectionDescriptor) -> Result<Arc<Namespace>, Error> {
        self.namespaces
            .get(connection)
            .map(|namespace| Arc::clone(namespace.value()))
            .ok_or_else(|| Error::NamespaceNotFound(connection.to_string()))
    }

    fn namespace_or_create(&self, connection: &ConnectionDescriptor) -> Arc<Namespace> {
        Arc::clone(
            self.namespaces
                .entry(connection.clone())
                .or_default()
                .value(),
        )
    }

    fn store(&self, destination: &Destination) -> Result<Arc<MessageStore>, Error> {
        let namespace = self.namespace(destination.connection())?;

        let store = match destination.subscription_name() {
            Some(subscription) => namespace
                .topics
                .get(destination.name())
                .and_then(|topic| {
                    topic
                        .subscriptions
                        .get(subscription)
                        .map(|store| Arc::clone(store.value()))
                }),
            None => namespace
                .queues
                .get(destination.name())
                .map(|store| Arc::clone(store.value())),
        };

        store.ok_or_else(|| Error::EntityNotFound(destination.to_string()))
    }
}

#[derive(Clone, Debug)]
enum Target {
    Queue(Arc<MessageStore>),
    Topic(Arc<Topic>),
}

/// Sender bound to a memory queue or topic.
#[derive(Clone)]
pub struct MemorySender {
    destination: Destination,
    target: Target,
    closed: Arc<AtomicBool>,
}

impl Debug for MemorySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySender")
            .field("destination", &self.destination)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SenderHandle for MemorySender {
    type Error = Error;

    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn send(&self, envelope: Envelope) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(Error::SenderClosed(self.destination.to_string()));
        }

        match &self.target {
            Target::Queue(store) => store.enqueue(envelope),
            Target::Topic(topic) => {
                if topic.subscriptions.is_empty() {
                    debug!(
                        "Topic {} has no subscriptions, dropping message {}",
                        self.destination, envelope.message_id
                    );
                }

                for subscription in &topic.subscriptions {
                    subscription.value().enqueue(envelope.clone());
                }
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        debug!("Closing memory sender for {}", self.destination);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Peek-lock receiver for a memory queue or subscription.
#[derive(Clone)]
pub struct MemoryReceiver {
    destination: Destination,
    store: Arc<MessageStore>,
    receive_wait: Duration,
}

impl Debug for MemoryReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryReceiver")
            .field("destination", &self.destination)
            .field("receive_wait", &self.receive_wait)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Receiver for MemoryReceiver {
    type Error = Error;

    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn receive(&self) -> Result<Option<ReceivedMessage>, Self::Error> {
        let deadline = Instant::now() + self.receive_wait;

        loop {
            let notified = self.store.notify().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            if let Some(message) = self.store.try_lock(now)? {
                return Ok(Some(message));
            }

            if now >= deadline {
                return Ok(None);
            }

            let wake_at = self
                .store
                .next_lock_expiry()
                .map_or(deadline, |expiry| expiry.min(deadline));

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn complete(&self, message: &ReceivedMessage) -> Result<(), Self::Error> {
        self.store.complete(message)
    }

    async fn abandon(&self, message: &ReceivedMessage) -> Result<(), Self::Error> {
        self.store.abandon(message)
    }

    async fn dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), Self::Error> {
        self.store.dead_letter(message, reason, description)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Error = Error;
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    async fn create_sender(&self, destination: &Destination) -> Result<Self::Sender, Self::Error> {
        if destination.is_subscription() {
            return Err(Error::InvalidDestination(format!(
                "cannot send to subscription {destination}"
            )));
        }

        let namespace = self.namespace(destination.connection())?;

        let queue = namespace
            .queues
            .get(destination.name())
            .map(|store| Target::Queue(Arc::clone(store.value())));
        let target = match queue {
            Some(target) => target,
            None => namespace
                .topics
                .get(destination.name())
                .map(|topic| Target::Topic(Arc::clone(topic.value())))
                .ok_or_else(|| Error::EntityNotFound(destination.to_string()))?,
        };

        self.senders_created.fetch_add(1, Ordering::SeqCst);
        debug!("Created memory sender for {}", destination);

        Ok(MemorySender {
            destination: destination.clone(),
            target,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn create_receiver(
        &self,
        destination: &Destination,
    ) -> Result<Self::Receiver, Self::Error> {
        let store = self.store(destination)?;

        debug!("Created memory receiver for {}", store.path());

        Ok(MemoryReceiver {
            destination: destination.clone(),
            store,
            receive_wait: self.options.receive_wait,
        })
    }
}

#[async_trait]
impl Administrator for MemoryBroker {
    type Error = Error;

    async fn create_queue_if_not_exists(
        &self,
        destination: &Destination,
        options: &QueueOptions,
    ) -> Result<(), Self::Error> {
        if destination.is_subscription() {
            return Err(Error::InvalidDestination(format!(
                "queue {destination} cannot have a subscription"
            )));
        }

        let namespace = self.namespace_or_create(destination.connection());

        if namespace.topics.contains_key(destination.name()) {
            return Err(Error::EntityConflict(destination.to_string()));
        }

        namespace
            .queues
            .entry(destination.name().to_string())
            .or_insert_with(|| {
                info!("Creating memory queue {}", destination);
                Arc::new(MessageStore::new(destination.entity_path(), options.clone()))
            });

        Ok(())
    }

    async fn create_topic_if_not_exists(
        &self,
        destination: &Destination,
        options: &SubscriptionOptions,
    ) -> Result<(), Self::Error> {
        let namespace = self.namespace_or_create(destination.connection());

        if namespace.queues.contains_key(destination.name()) {
            return Err(Error::EntityConflict(destination.to_string()));
        }

        let topic = Arc::clone(
            namespace
                .topics
                .entry(destination.name().to_string())
                .or_insert_with(|| {
                    info!("Creating memory topic {}", destination.without_subscription());
                    Arc::new(Topic::default())
                })
                .value(),
        );

        if let Some(subscription) = destination.subscription_name() {
            topic
                .subscriptions
                .entry(subscription.to_string())
                .or_insert_with(|| {
                    info!("Creating memory subscription {}", destination);
                    Arc::new(MessageStore::new(
                        destination.entity_path(),
                        QueueOptions::from(options),
                    ))
                });
        }

        Ok(())
    }
}
