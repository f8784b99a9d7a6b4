use crate::error::Error;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

/// A long-running message consumer.
#[async_trait]
pub trait Consumer
where
    Self: Send + Sync + 'static,
{
    /// The consumer's name.
    fn name(&self) -> &str;

    /// Starts consuming.
    async fn start(&self) -> Result<(), Error>;

    /// Stops consuming new messages.
    async fn stop(&self);

    /// Waits for the consumer to exit.
    async fn wait(&self);
}

#[async_trait]
impl<C> Consumer for Arc<C>
where
    C: Consumer,
{
    fn name(&self) -> &str {
        C::name(self)
    }

    async fn start(&self) -> Result<(), Error> {
        C::start(self).await
    }

    async fn stop(&self) {
        C::stop(self).await;
    }

    async fn wait(&self) {
        C::wait(self).await;
    }
}

/// Consumers started together before traffic and stopped together.
#[derive(Default)]
pub struct Consumers {
    consumers: Vec<Box<dyn Consumer>>,
}

impl Consumers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a consumer.
    pub fn add(&mut self, consumer: impl Consumer) -> &mut Self {
        self.consumers.push(Box::new(consumer));
        self
    }

    /// Number of consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Starts every consumer in insertion order.
    ///
    /// # Errors
    ///
    /// Returns the first start failure, after stopping the consumers already started.
    pub async fn start(&self) -> Result<(), Error> {
        for (index, consumer) in self.consumers.iter().enumerate() {
            if let Err(e) = consumer.start().await {
                warn!("Failed to start consumer '{}': {}", consumer.name(), e);

                for started in &self.consumers[..index] {
                    started.stop().await;
                }

                return Err(e);
            }
        }

        info!("Started {} consumer(s)", self.consumers.len());
        Ok(())
    }

    /// Stops every consumer.
    pub async fn stop(&self) {
        for consumer in &self.consumers {
            consumer.stop().await;
        }
    }

    /// Waits for every consumer to exit.
    pub async fn wait(&self) {
        join_all(self.consumers.iter().map(|consumer| consumer.wait())).await;
    }
}

impl Debug for Consumers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.consumers.iter().map(|consumer| consumer.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Probe {
        fail: bool,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Consumer for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn start(&self) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Stopped);
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn wait(&self) {}
    }

    #[tokio::test]
    async fn test_failed_start_stops_started_consumers() {
        let first = Arc::new(Probe::default());
        let failing = Arc::new(Probe {
            fail: true,
            ..Probe::default()
        });
        let never = Arc::new(Probe::default());

        let mut consumers = Consumers::new();
        consumers
            .add(Arc::clone(&first))
            .add(Arc::clone(&failing))
            .add(Arc::clone(&never));

        assert_matches!(consumers.start().await, Err(Error::Stopped));
        assert_eq!(first.starts.load(Ordering::SeqCst), 1);
        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(never.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let probe = Arc::new(Probe::default());

        let mut consumers = Consumers::new();
        consumers.add(Arc::clone(&probe)).add(Arc::clone(&probe));

        consumers.start().await.unwrap();
        consumers.stop().await;
        consumers.wait().await;

        assert_eq!(consumers.len(), 2);
        assert_eq!(probe.starts.load(Ordering::SeqCst), 2);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 2);
    }
}
