use crate::error::Error;

use proven_broker::{Administrator, Destination, QueueOptions, SubscriptionOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Properties applied to entities created by [`ensure_topology`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyOptions {
    /// Queue properties.
    pub queue: QueueOptions,

    /// Topic subscription properties.
    pub subscription: SubscriptionOptions,
}

/// Creates any missing entities for producers.
///
/// Destinations naming a subscription create the topic and the subscription,
/// all others create a queue.
///
/// # Errors
///
/// Returns the first broker failure.
pub async fn ensure_topology<A>(
    administrator: &A,
    destinations: &[Destination],
    options: &TopologyOptions,
) -> Result<(), Error>
where
    A: Administrator,
{
    for destination in destinations {
        debug!("Ensuring {} exists", destination);

        let result = if destination.is_subscription() {
            administrator
                .create_topic_if_not_exists(destination, &options.subscription)
                .await
        } else {
            administrator
                .create_queue_if_not_exists(destination, &options.queue)
                .await
        };

        result.map_err(Error::broker)?;
    }

    Ok(())
}
