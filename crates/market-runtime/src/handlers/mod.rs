//! # Post-Commit Consumers
//!
//! Each handler reads a [`ConsumerFeed`]: a bus subscription paired with the
//! consumer's durable outbox cursor. It runs until the bus closes and has
//! handed over everything queued before the close. Handlers see events
//! only after the ledger mutation that produced them committed; a handler
//! failure is logged and counted, never propagated back into the ledger.
//!
//! | Handler | Topics | Effect |
//! |---------|--------|--------|
//! | [`NotificationHandler`] | escrow, review, payout | one notification per event |
//! | [`AuditHandler`] | audit | one audit log entry per state change |
//! | [`PayoutHandler`] | review | credits the clipper for each settlement |

pub mod audit;
pub mod notification;
pub mod payout;

pub use audit::{AuditHandler, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use notification::{LoggingNotificationSink, Notification, NotificationHandler, NotificationSink};
pub use payout::PayoutHandler;

use escrow_ledger::ConsumerCursor;
use market_telemetry::EVENTS_HANDLED;
use shared_bus::{EventEnvelope, Subscription};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by an external sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Sink rejected the entry: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ok,
    Duplicate,
    Failed,
}

pub(crate) fn count(consumer: &str, outcome: Outcome) {
    let label = match outcome {
        Outcome::Ok => "ok",
        Outcome::Duplicate => "duplicate",
        Outcome::Failed => "failed",
    };
    EVENTS_HANDLED.with_label_values(&[consumer, label]).inc();
}

/// A subscription that skips what its consumer already handled.
pub struct ConsumerFeed {
    subscription: Subscription,
    cursor: ConsumerCursor,
}

impl ConsumerFeed {
    #[must_use]
    pub fn new(subscription: Subscription, cursor: ConsumerCursor) -> Self {
        Self {
            subscription,
            cursor,
        }
    }

    #[must_use]
    pub fn consumer(&self) -> &str {
        self.cursor.name()
    }

    /// Next event this consumer has not handled. `None` once the bus is
    /// closed and drained.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        while let Some(envelope) = self.subscription.recv().await {
            if !self.cursor.is_handled(envelope.sequence) {
                return Some(envelope);
            }
            debug!(
                consumer = self.cursor.name(),
                sequence = envelope.sequence,
                "Redelivery skipped"
            );
            count(self.cursor.name(), Outcome::Duplicate);
        }
        None
    }

    /// Record everything received so far as handled.
    pub async fn commit(&mut self) {
        let position = self.subscription.position();
        if let Err(e) = self.cursor.advance(position).await {
            warn!(
                consumer = self.cursor.name(),
                ?position,
                error = %e,
                "Consumer offset not saved, events will be redelivered"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ConsumerFeed;
    use escrow_ledger::{ConsumerCursor, ConsumerOffsets, LedgerError};
    use parking_lot::Mutex;
    use shared_bus::{EventFilter, InMemoryEventBus};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Offsets in a map; accepts any sequence.
    #[derive(Default)]
    pub struct MapOffsets(Mutex<HashMap<String, u64>>);

    impl ConsumerOffsets for MapOffsets {
        fn register_consumer(&self, consumer: &str) -> Result<u64, LedgerError> {
            Ok(*self.0.lock().entry(consumer.to_string()).or_insert(0))
        }

        fn acknowledge(&self, consumer: &str, sequence: u64) -> Result<usize, LedgerError> {
            let mut offsets = self.0.lock();
            let next = offsets
                .get_mut(consumer)
                .ok_or_else(|| LedgerError::InvalidInput(consumer.to_string()))?;
            *next = (*next).max(sequence + 1);
            Ok(0)
        }

        fn consumer_offset(&self, consumer: &str) -> Option<u64> {
            self.0.lock().get(consumer).copied()
        }
    }

    pub fn feed(
        bus: &InMemoryEventBus,
        filter: EventFilter,
        offsets: &Arc<MapOffsets>,
        consumer: &str,
    ) -> ConsumerFeed {
        let offsets: Arc<dyn ConsumerOffsets> = offsets.clone();
        let cursor = ConsumerCursor::register(offsets, consumer).unwrap();
        ConsumerFeed::new(bus.subscribe(filter), cursor)
    }
}
