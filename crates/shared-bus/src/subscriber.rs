//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventEnvelope, EventFilter, UNSEQUENCED};
use tokio::sync::mpsc;

/// A subscription handle for receiving events.
///
/// Dropping it removes its queue from the bus on the next publish.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    filter: EventFilter,
    position: Option<u64>,
}

impl Subscription {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<EventEnvelope>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            position: None,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus is closed and everything queued before
    /// the close has been received.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            let envelope = self.receiver.recv().await?;

            if envelope.sequence != UNSEQUENCED {
                let seen = envelope.sequence;
                self.position = Some(self.position.map_or(seen, |p| p.max(seen)));
            }

            if self.filter.matches(&envelope) {
                return Some(envelope);
            }
        }
    }

    /// Highest outbox sequence taken off the queue so far, matching the
    /// filter or not.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.position
    }
}
