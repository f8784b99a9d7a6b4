/// Dead-letter reason used when a handler keeps failing.
pub const MAX_DELIVERY_ATTEMPTS_EXCEEDED: &str = "MaxDeliveryAttemptsExceeded";

/// How a delivery is acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// Remove the message.
    Complete,

    /// Release the lock for immediate redelivery.
    Abandon,

    /// Quarantine the message.
    DeadLetter,
}

/// Decides between retrying and quarantining a failed delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_delivery_attempts: u32,
}

impl RetryPolicy {
    /// Policy tolerating `max_delivery_attempts` failed deliveries.
    #[must_use]
    pub const fn new(max_delivery_attempts: u32) -> Self {
        Self {
            max_delivery_attempts,
        }
    }

    /// Settlement for a delivery whose processing failed.
    #[must_use]
    pub const fn on_failure(&self, delivery_count: u32) -> Settlement {
        if delivery_count > self.max_delivery_attempts {
            Settlement::DeadLetter
        } else {
            Settlement::Abandon
        }
    }

    /// Settlement for a delivery with the given handler outcome.
    #[must_use]
    pub const fn settle(&self, succeeded: bool, delivery_count: u32) -> Settlement {
        if succeeded {
            Settlement::Complete
        } else {
            self.on_failure(delivery_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letters_after_max_attempts() {
        let policy = RetryPolicy::new(3);

        for delivery_count in 1..=3 {
            assert_eq!(policy.on_failure(delivery_count), Settlement::Abandon);
        }
        assert_eq!(policy.on_failure(4), Settlement::DeadLetter);
        assert_eq!(policy.on_failure(9), Settlement::DeadLetter);
    }

    #[test]
    fn test_success_always_completes() {
        let policy = RetryPolicy::new(0);

        assert_eq!(policy.settle(true, 50), Settlement::Complete);
        assert_eq!(policy.settle(false, 1), Settlement::DeadLetter);
    }
}
