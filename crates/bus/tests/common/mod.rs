//! Shared messages, handlers and helpers for the bus integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use proven_broker::ConnectionDescriptor;
use proven_broker_memory::{MemoryBroker, MemoryBrokerOptions};
use proven_bus::{
    BoxError, Command, CommandHandler, ConsumerConfig, DeliveryContext, Event, EventHandler,
    Message, MessageHeaders,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrder {
    headers: MessageHeaders,
    order_id: String,
}

impl AddOrder {
    pub fn new(order_id: &str) -> Self {
        Self {
            headers: MessageHeaders::new(),
            order_id: order_id.to_string(),
        }
    }

    pub fn with_correlation_id(order_id: &str, correlation_id: &str) -> Self {
        Self {
            headers: MessageHeaders::new().with_correlation_id(correlation_id),
            order_id: order_id.to_string(),
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }
}

impl Message for AddOrder {
    fn headers(&self) -> &MessageHeaders {
        &self.headers
    }
}

impl Command for AddOrder {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    headers: MessageHeaders,
    order_id: String,
}

impl OrderCreated {
    pub fn new(order_id: &str) -> Self {
        Self {
            headers: MessageHeaders::new(),
            order_id: order_id.to_string(),
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }
}

impl Message for OrderCreated {
    fn headers(&self) -> &MessageHeaders {
        &self.headers
    }
}

impl Event for OrderCreated {}

/// Records every order id it sees, optionally failing every time.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
    contexts: Arc<Mutex<Vec<DeliveryContext>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    fail: bool,
    delay: Option<Duration>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn contexts(&self) -> Vec<DeliveryContext> {
        self.contexts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of deliveries seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, order_id: &str, context: &DeliveryContext) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(format!("cannot handle order {order_id}").into());
        }

        self.seen.lock().push(order_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<AddOrder> for Recorder {
    async fn handle(&self, command: &AddOrder, context: &DeliveryContext) -> Result<(), BoxError> {
        self.record(command.order_id(), context).await
    }
}

#[async_trait]
impl EventHandler<OrderCreated> for Recorder {
    async fn handle(
        &self,
        event: &OrderCreated,
        context: &DeliveryContext,
    ) -> Result<(), BoxError> {
        self.record(event.order_id(), context).await
    }
}

pub fn connection(name: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new(format!("memory://{name}"))
}

pub fn broker() -> MemoryBroker {
    MemoryBroker::new(MemoryBrokerOptions {
        receive_wait: Duration::from_millis(20),
    })
}

pub fn config(name: &str) -> ConsumerConfig {
    ConsumerConfig::new(connection(name), "orders-service")
        .with_fault_backoff(Duration::from_millis(10))
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
