use crate::destination::DestinationResolver;
use crate::error::Error;
use crate::message::Message;

use std::fmt::{self, Debug};
use std::sync::Arc;

use dashmap::DashMap;
use proven_broker::{Broker, Destination, SenderHandle};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Caches one sender per destination for the lifetime of the process.
pub struct SenderPool<B>
where
    B: Broker,
{
    broker: B,
    resolver: Arc<dyn DestinationResolver>,
    senders: DashMap<Destination, Arc<OnceCell<B::Sender>>>,
}

impl<B> SenderPool<B>
where
    B: Broker,
{
    /// Creates an empty pool.
    pub fn new(broker: B, resolver: impl DestinationResolver) -> Self {
        Self {
            broker,
            resolver: Arc::new(resolver),
            senders: DashMap::new(),
        }
    }

    /// Resolves the destination for `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unroutable`] if the resolver has no route for `M`.
    pub fn resolve<M: Message>(&self) -> Result<Destination, Error> {
        self.resolver.resolve(M::type_name())
    }

    /// Returns the cached sender for `M`'s destination, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `M` is unroutable or the broker fails to create the sender.
    pub async fn acquire_for<M: Message>(&self) -> Result<B::Sender, Error> {
        let destination = self.resolve::<M>()?;
        self.acquire(&destination).await
    }

    /// Returns the cached sender for `destination`, creating it if needed.
    ///
    /// Concurrent callers share a single creation. A cached sender that
    /// reports itself closed is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination has no name or the broker fails to
    /// create the sender.
    pub async fn acquire(&self, destination: &Destination) -> Result<B::Sender, Error> {
        if destination.name().trim().is_empty() {
            return Err(Error::InvalidDestination(
                "destination name is empty".to_string(),
            ));
        }

        loop {
            let cell = Arc::clone(self.senders.entry(destination.clone()).or_default().value());

            let mut created = false;
            let initialized = cell
                .get_or_try_init(|| {
                    created = true;
                    self.create(destination)
                })
                .await;

            let sender = match initialized {
                Ok(sender) => sender.clone(),
                Err(e) => {
                    // A failed creation leaves an empty cell behind.
                    self.senders.remove_if(destination, |_, current| {
                        Arc::ptr_eq(current, &cell) && current.get().is_none()
                    });
                    return Err(e);
                }
            };

            if !sender.is_closed() || created {
                return Ok(sender);
            }

            // Only the cell we looked at is removed, so concurrent replacers
            // converge on one new sender.
            if self
                .senders
                .remove_if(destination, |_, current| Arc::ptr_eq(current, &cell))
                .is_some()
            {
                debug!("Replacing closed sender for {}", destination);
            }
        }
    }

    /// Closes every cached sender and empties the cache.
    ///
    /// Failures to close are logged and do not stop the remaining senders from
    /// being closed.
    pub async fn dispose(&self) {
        let cells: Vec<_> = self
            .senders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.senders.clear();

        for sender in cells.iter().filter_map(|cell| cell.get()) {
            if sender.is_closed() {
                continue;
            }

            if let Err(e) = sender.close().await {
                warn!("Failed to close sender for {}: {}", sender.destination(), e);
            }
        }
    }

    /// Number of cached destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    async fn create(&self, destination: &Destination) -> Result<B::Sender, Error> {
        debug!("Creating sender for {}", destination);

        self.broker
            .create_sender(destination)
            .await
            .map_err(Error::broker)
    }
}

impl<B> Debug for SenderPool<B>
where
    B: Broker,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderPool")
            .field("broker", &self.broker)
            .field("resolver", &self.resolver)
            .field("senders", &self.senders.len())
            .finish()
    }
}
