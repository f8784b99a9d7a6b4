//! Processors pull one message type from one destination and settle each
//! delivery according to its handler outcome.

mod settlement;

pub use settlement::{MAX_DELIVERY_ATTEMPTS_EXCEEDED, RetryPolicy, Settlement};

use crate::config::ConsumerConfig;
use crate::consumers::Consumer;
use crate::destination::DestinationStrategy;
use crate::error::{BoxError, Error};
use crate::handler::{DeliveryContext, Dispatch, HandlerRegistry};
use crate::message::{Command, Event, Message};
use crate::serializer::MessageSerializer;

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use proven_broker::{Administrator, Broker, Destination, ReceivedMessage, Receiver};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Stopped,
}

struct Inner<B, M>
where
    B: Broker,
    M: Message,
{
    destination: Destination,
    receiver: B::Receiver,
    dispatch: Dispatch<M>,
    serializer: MessageSerializer,
    policy: RetryPolicy,
    max_concurrent_calls: usize,
    fault_backoff: Duration,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

/// A consumer bound to one destination and one message type.
pub struct Processor<B, M>
where
    B: Broker,
    M: Message,
{
    name: String,
    inner: Arc<Inner<B, M>>,
    state: Mutex<State>,
}

impl<B, C> Processor<B, C>
where
    B: Broker,
    C: Command,
{
    /// Creates a processor for a command queue.
    ///
    /// Creates the queue if it is missing and resolves the command's handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the command has no
    /// single handler, or the broker fails.
    pub async fn command<A>(
        broker: &B,
        administrator: &A,
        config: &ConsumerConfig,
        registry: &HandlerRegistry,
    ) -> Result<Self, Error>
    where
        A: Administrator,
    {
        config.validate()?;
        let dispatch = registry.command_dispatch::<C>()?;

        let queue = DestinationStrategy::from_config(config).entity_name(C::type_name());
        let destination = Destination::queue(queue, config.connection.clone());

        administrator
            .create_queue_if_not_exists(&destination, &config.queue_options)
            .await
            .map_err(Error::broker)?;

        Self::build(broker, destination, dispatch, config).await
    }
}

impl<B, E> Processor<B, E>
where
    B: Broker,
    E: Event,
{
    /// Creates a processor for a topic subscription named by the
    /// configuration's `subscription_or_client_id`.
    ///
    /// Creates the topic and subscription if missing and resolves every
    /// handler registered for the event.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or has no
    /// subscription name, or the broker fails.
    pub async fn event<A>(
        broker: &B,
        administrator: &A,
        config: &ConsumerConfig,
        registry: &HandlerRegistry,
    ) -> Result<Self, Error>
    where
        A: Administrator,
    {
        config.validate()?;

        let subscription = config.subscription_or_client_id.trim();
        if subscription.is_empty() {
            return Err(Error::InvalidConfig(
                "event consumers need a subscription name".to_string(),
            ));
        }

        let dispatch = registry.event_dispatch::<E>();

        let topic = DestinationStrategy::from_config(config).entity_name(E::type_name());
        let destination = Destination::subscription(topic, subscription, config.connection.clone());

        administrator
            .create_topic_if_not_exists(&destination, &config.subscription_options)
            .await
            .map_err(Error::broker)?;

        Self::build(broker, destination, dispatch, config).await
    }
}

impl<B, M> Processor<B, M>
where
    B: Broker,
    M: Message,
{
    async fn build(
        broker: &B,
        destination: Destination,
        dispatch: Dispatch<M>,
        config: &ConsumerConfig,
    ) -> Result<Self, Error> {
        let receiver = broker
            .create_receiver(&destination)
            .await
            .map_err(Error::broker)?;

        debug!(
            "Created processor for {} on {} with {} handler(s)",
            M::type_name(),
            destination,
            dispatch.len()
        );

        Ok(Self {
            name: destination.entity_path(),
            inner: Arc::new(Inner {
                destination,
                receiver,
                dispatch,
                serializer: MessageSerializer::new(config.serializer),
                policy: RetryPolicy::new(config.max_delivery_attempts),
                max_concurrent_calls: config.max_concurrent_calls,
                fault_backoff: config.fault_backoff,
                shutdown_token: CancellationToken::new(),
                task_tracker: TaskTracker::new(),
            }),
            state: Mutex::new(State::Created),
        })
    }

    /// The entity path the processor reads from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The destination the processor reads from.
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    /// Starts pulling messages. Calling it again while running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the processor has been stopped.
    pub fn start(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Started => return Ok(()),
                State::Stopped => return Err(Error::Stopped),
                State::Created => *state = State::Started,
            }
        }

        let inner = Arc::clone(&self.inner);
        self.inner.task_tracker.spawn(inner.pull());

        info!("Started processor '{}'", self.name);
        Ok(())
    }

    /// Stops pulling new messages. In-flight deliveries run to completion.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Stopped);
        if previous == State::Stopped {
            return;
        }

        self.inner.shutdown_token.cancel();
        self.inner.task_tracker.close();

        info!("Stopping processor '{}'", self.name);
    }

    /// Waits for the pull loop and every in-flight delivery to finish.
    pub async fn wait(&self) {
        self.inner.task_tracker.wait().await;
    }
}

impl<B, M> Inner<B, M>
where
    B: Broker,
    M: Message,
{
    async fn pull(self: Arc<Self>) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_calls));

        loop {
            // A permit is taken before receiving so no message is locked
            // without capacity to process it.
            let permit = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => break,
                received = self.receiver.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    let inner = Arc::clone(&self);
                    self.task_tracker.spawn(async move {
                        inner.process(message).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        target: "proven_bus::broker",
                        "An exception has occurred while receiving from {}: {}",
                        self.destination,
                        e
                    );

                    tokio::select! {
                        biased;
                        () = self.shutdown_token.cancelled() => break,
                        () = tokio::time::sleep(self.fault_backoff) => {}
                    }
                }
            }
        }

        debug!("Processor for {} stopped pulling", self.destination);
    }

    async fn process(&self, message: ReceivedMessage) {
        info!("Received message '{}'. Processing...", message.message_id());

        let context = DeliveryContext {
            message_id: message.message_id().to_string(),
            correlation_id: message.envelope.correlation_id.clone(),
            delivery_count: message.delivery_count,
            destination: self.destination.clone(),
            cancellation: self.shutdown_token.child_token(),
        };

        let outcome: Result<(), BoxError> =
            match self.serializer.deserialize::<M>(&message.envelope.body) {
                Ok(payload) => self.dispatch.invoke(&payload, &context).await,
                Err(e) => Err(e.into()),
            };

        let description = match &outcome {
            Ok(()) => String::new(),
            Err(e) => {
                error!(
                    "An error has occurred while processing message '{}': {}",
                    message.message_id(),
                    e
                );
                e.to_string()
            }
        };

        let settlement = self
            .policy
            .settle(outcome.is_ok(), message.delivery_count);

        let result = match settlement {
            Settlement::Complete => self.receiver.complete(&message).await,
            Settlement::Abandon => self.receiver.abandon(&message).await,
            Settlement::DeadLetter => {
                self.receiver
                    .dead_letter(&message, MAX_DELIVERY_ATTEMPTS_EXCEEDED, &description)
                    .await
            }
        };

        match result {
            Ok(()) => debug!(
                "Settled message '{}' as {:?} after {} delivery(ies)",
                message.message_id(),
                settlement,
                message.delivery_count
            ),
            Err(e) => warn!(
                "Failed to settle message '{}' as {:?}: {}",
                message.message_id(),
                settlement,
                e
            ),
        }
    }
}

impl<B, M> Drop for Processor<B, M>
where
    B: Broker,
    M: Message,
{
    fn drop(&mut self) {
        self.inner.shutdown_token.cancel();
    }
}

impl<B, M> Debug for Processor<B, M>
where
    B: Broker,
    M: Message,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("destination", &self.inner.destination)
            .field("dispatch", &self.inner.dispatch)
            .field("policy", &self.inner.policy)
            .field("max_concurrent_calls", &self.inner.max_concurrent_calls)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<B, M> Consumer for Processor<B, M>
where
    B: Broker,
    M: Message,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), Error> {
        Self::start(self)
    }

    async fn stop(&self) {
        Self::stop(self);
    }

    async fn wait(&self) {
        Self::wait(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::CommandHandler;
    use crate::message::MessageHeaders;

    use proven_broker::{ConnectionDescriptor, Envelope, SenderHandle};
    use proven_broker_memory::{MemoryBroker, MemoryBrokerOptions};
    use serde::{Deserialize, Serialize};
    use tracing_test::traced_test;

    #[derive(Debug, Serialize, Deserialize)]
    struct Restock {
        headers: MessageHeaders,
        sku: String,
    }

    impl Message for Restock {
        fn headers(&self) -> &MessageHeaders {
            &self.headers
        }
    }

    impl Command for Restock {}

    struct Accept;

    #[async_trait]
    impl CommandHandler<Restock> for Accept {
        async fn handle(&self, _: &Restock, _: &DeliveryContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    async fn processor(broker: &MemoryBroker, name: &str) -> Processor<MemoryBroker, Restock> {
        let mut registry = HandlerRegistry::new();
        registry.register_command::<Restock, _>(Accept);

        let config = ConsumerConfig::new(
            ConnectionDescriptor::new(format!("memory://{name}")),
            "warehouse",
        )
        .with_fault_backoff(Duration::from_millis(10));

        Processor::command(broker, broker, &config, &registry)
            .await
            .unwrap()
    }

    async fn send(broker: &MemoryBroker, destination: &Destination, body: Vec<u8>) {
        let sender = broker.create_sender(destination).await.unwrap();
        sender.send(Envelope::new("m-1", body)).await.unwrap();
    }

    fn broker() -> MemoryBroker {
        MemoryBroker::new(MemoryBrokerOptions {
            receive_wait: Duration::from_millis(10),
        })
    }

    #[traced_test]
    #[tokio::test]
    async fn test_successful_delivery_logs_intake_and_completes() {
        let broker = broker();
        let processor = processor(&broker, "unit-success").await;
        let destination = processor.destination().clone();

        let restock = Restock {
            headers: MessageHeaders::new(),
            sku: "ipa-33cl".to_string(),
        };
        send(&broker, &destination, serde_json::to_vec(&restock).unwrap()).await;

        let message = processor.inner.receiver.receive().await.unwrap().unwrap();
        processor.inner.process(message).await;

        assert_eq!(broker.message_count(&destination).unwrap(), 0);
        assert!(logs_contain("Received message 'm-1'. Processing..."));
        assert!(logs_contain("as Complete"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_malformed_body_is_abandoned_first() {
        let broker = broker();
        let processor = processor(&broker, "unit-malformed").await;
        let destination = processor.destination().clone();

        send(&broker, &destination, b"\x00\x01".to_vec()).await;

        let message = processor.inner.receiver.receive().await.unwrap().unwrap();
        processor.inner.process(message).await;

        // Back in the queue for redelivery
        assert_eq!(broker.message_count(&destination).unwrap(), 1);
        assert!(broker.dead_letters(&destination).unwrap().is_empty());
        assert!(logs_contain("Failed to deserialize message"));
        assert!(logs_contain("as Abandon"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_broker_faults_are_logged_and_pulling_continues() {
        let broker = broker();
        let processor = processor(&broker, "unit-fault").await;
        let destination = processor.destination().clone();

        broker.inject_receive_fault(&destination, 1).unwrap();

        let pull = Arc::clone(&processor.inner).pull();
        let _ = tokio::time::timeout(Duration::from_millis(100), pull).await;

        assert!(logs_contain("An exception has occurred while receiving from"));
        assert!(logs_contain("unit-fault/restock"));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let broker = broker();
        let processor = processor(&broker, "unit-stop").await;

        processor.stop();

        assert!(matches!(processor.start(), Err(Error::Stopped)));
        tokio::time::timeout(Duration::from_secs(1), processor.wait())
            .await
            .unwrap();
    }
}
