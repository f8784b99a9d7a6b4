//! Command and event transport over peek-lock message brokers.
//!
//! Producers send commands to queues and publish events to topics through a
//! [`ServiceBus`], which keeps one cached sender per destination in a
//! [`SenderPool`]. Consumers are [`Processor`]s: each pulls one message type
//! from one queue or topic subscription with bounded concurrency, dispatches
//! to the handlers resolved from a [`HandlerRegistry`], and settles every
//! delivery. Successful deliveries are completed, failed ones abandoned for
//! redelivery until the retry budget is spent, then dead-lettered.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod consumers;
mod destination;
mod error;
mod handler;
mod message;
mod processor;
mod sender_pool;
mod serializer;
mod service_bus;
mod topology;

pub use config::{ConsumerConfig, DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_MAX_DELIVERY_ATTEMPTS};
pub use consumers::{Consumer, Consumers};
pub use destination::{
    ConventionResolver, DestinationMap, DestinationResolver, DestinationStrategy,
    convention_name,
};
pub use error::{BoxError, Error, HandlerPanic, SerializerError};
pub use handler::{CommandHandler, DeliveryContext, Dispatch, EventHandler, HandlerRegistry};
pub use message::{CORRELATION_ID_KEY, Command, Event, Message, MessageHeaders};
pub use processor::{MAX_DELIVERY_ATTEMPTS_EXCEEDED, Processor, RetryPolicy, Settlement};
pub use sender_pool::SenderPool;
pub use serializer::{MessageSerializer, SerializationFormat, SerializerConfig};
pub use service_bus::{COMMAND_NAME_PROPERTY, EVENT_NAME_PROPERTY, ServiceBus};
pub use topology::{TopologyOptions, ensure_topology};
