use crate::Error;

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use proven_broker::{
    DEAD_LETTER_ERROR_DESCRIPTION_PROPERTY, DEAD_LETTER_REASON_PROPERTY, Envelope, LockToken,
    MAX_DELIVERY_COUNT_EXCEEDED, QueueOptions, ReceivedMessage, TTL_EXPIRED,
};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
struct StoredMessage {
    envelope: Envelope,
    sequence_number: u64,
    delivery_count: u32,
    expires_at: Option<Instant>,
}

impl StoredMessage {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug)]
struct LockedMessage {
    message: StoredMessage,
    locked_until: Instant,
}

#[derive(Debug, Default)]
struct StoreState {
    available: VecDeque<StoredMessage>,
    locked: HashMap<LockToken, LockedMessage>,
    dead_letters: Vec<Envelope>,
    next_sequence_number: u64,
    pending_faults: usize,
}

impl StoreState {
    // Keeps `available` ordered by sequence number so redelivered messages
    // regain their original position.
    fn make_available(&mut self, message: StoredMessage) {
        let position = self
            .available
            .partition_point(|m| m.sequence_number < message.sequence_number);
        self.available.insert(position, message);
    }

    fn dead_letter(&mut self, mut message: StoredMessage, reason: &str, description: &str) {
        message
            .envelope
            .application_properties
            .insert(DEAD_LETTER_REASON_PROPERTY.to_string(), reason.to_string());
        message.envelope.application_properties.insert(
            DEAD_LETTER_ERROR_DESCRIPTION_PROPERTY.to_string(),
            description.to_string(),
        );
        self.dead_letters.push(message.envelope);
    }
}

/// Storage behind a queue or a topic subscription.
#[derive(Debug)]
pub struct MessageStore {
    path: String,
    options: QueueOptions,
    state: Mutex<StoreState>,
    notify: Notify,
}

impl MessageStore {
    pub fn new(path: String, options: QueueOptions) -> Self {
        Self {
            path,
            options,
            state: Mutex::new(StoreState::default()),
            notify: Notify::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn notify(&self) -> &Notify {
        &self.notify
    }

    pub fn enqueue(&self, envelope: Envelope) {
        let now = Instant::now();
        let expires_at = envelope
            .time_to_live
            .or(self.options.default_message_ttl)
            .and_then(|ttl| now.checked_add(ttl));

        {
            let mut state = self.state.lock();
            let sequence_number = state.next_sequence_number;
            state.next_sequence_number += 1;

            debug!(
                "Enqueued message {} on {} at sequence {}",
                envelope.message_id, self.path, sequence_number
            );

            state.available.push_back(StoredMessage {
                envelope,
                sequence_number,
                delivery_count: 0,
                expires_at,
            });
        }

        self.notify.notify_waiters();
    }

    /// Locks the next deliverable message, if any.
    pub fn try_lock(&self, now: Instant) -> Result<Option<ReceivedMessage>, Error> {
        let mut state = self.state.lock();

        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            return Err(Error::ConnectionLost(self.path.clone()));
        }

        self.reclaim_expired_locks(&mut state, now);

        while let Some(mut message) = state.available.pop_front() {
            if message.is_expired(now) {
                if self.options.dead_lettering_on_message_expiration {
                    debug!(
                        "Message {} on {} expired, dead-lettering",
                        message.envelope.message_id, self.path
                    );
                    state.dead_letter(message, TTL_EXPIRED, "Message time-to-live elapsed");
                }
                continue;
            }

            message.delivery_count += 1;

            if message.delivery_count > self.options.max_delivery_count {
                warn!(
                    "Message {} on {} exceeded max delivery count {}",
                    message.envelope.message_id, self.path, self.options.max_delivery_count
                );
                state.dead_letter(
                    message,
                    MAX_DELIVERY_COUNT_EXCEEDED,
                    "Message could not be consumed after maximum delivery attempts",
                );
                continue;
            }

            let lock_token = LockToken::new();
            let received = ReceivedMessage {
                envelope: message.envelope.clone(),
                delivery_count: message.delivery_count,
                sequence_number: message.sequence_number,
                lock_token,
            };

            state.locked.insert(
                lock_token,
                LockedMessage {
                    message,
                    locked_until: now + self.options.lock_duration,
                },
            );

            return Ok(Some(received));
        }

        Ok(None)
    }

    /// Earliest instant at which a held lock expires.
    pub fn next_lock_expiry(&self) -> Option<Instant> {
        self.state
            .lock()
            .locked
            .values()
            .map(|locked| locked.locked_until)
            .min()
    }

    pub fn complete(&self, message: &ReceivedMessage) -> Result<(), Error> {
        self.take_lock(message)?;
        debug!("Completed message {} on {}", message.message_id(), self.path);
        Ok(())
    }

    pub fn abandon(&self, message: &ReceivedMessage) -> Result<(), Error> {
        let stored = self.take_lock(message)?;
        self.state.lock().make_available(stored);
        self.notify.notify_waiters();

        debug!("Abandoned message {} on {}", message.message_id(), self.path);
        Ok(())
    }

    pub fn dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), Error> {
        let stored = self.take_lock(message)?;
        self.state.lock().dead_letter(stored, reason, description);

        debug!(
            "Dead-lettered message {} on {}: {}",
            message.message_id(),
            self.path,
            reason
        );
        Ok(())
    }

    /// Active messages, locked ones included.
    pub fn message_count(&self) -> usize {
        let state = self.state.lock();
        state.available.len() + state.locked.len()
    }

    pub fn dead_letters(&self) -> Vec<Envelope> {
        self.state.lock().dead_letters.clone()
    }

    pub fn inject_faults(&self, count: usize) {
        self.state.lock().pending_faults += count;
        self.notify.notify_waiters();
    }

    fn take_lock(&self, message: &ReceivedMessage) -> Result<StoredMessage, Error> {
        let mut state = self.state.lock();

        let Some(locked) = state.locked.remove(&message.lock_token) else {
            return Err(Error::LockLost(message.message_id().to_string()));
        };

        if locked.locked_until <= Instant::now() {
            state.make_available(locked.message);
            drop(state);
            self.notify.notify_waiters();
            return Err(Error::LockLost(message.message_id().to_string()));
        }

        Ok(locked.message)
    }

    fn reclaim_expired_locks(&self, state: &mut StoreState, now: Instant) {
        let expired: Vec<LockToken> = state
            .locked
            .iter()
            .filter(|(_, locked)| locked.locked_until <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            if let Some(locked) = state.locked.remove(&token) {
                debug!(
                    "Lock on message {} on {} expired",
                    locked.message.envelope.message_id, self.path
                );
                state.make_available(locked.message);
            }
        }
    }
}
