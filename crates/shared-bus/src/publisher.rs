//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventEnvelope, EventFilter};
use crate::subscriber::Subscription;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Trait for publishing events to the bus.
///
/// The outbox relay is the only producer: it calls this after the ledger
/// mutation that produced the event has committed.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// Returns the number of live subscriptions the event was queued for.
    async fn publish(&self, envelope: EventEnvelope) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Every subscription owns an unbounded queue, so a slow consumer delays
/// only itself and never loses an event. Memory is bounded by the outbox:
/// the relay only publishes entries that are still retained there.
///
/// Suitable for single-instance operation; multi-instance deployments would
/// put a broker behind `EventPublisher`.
pub struct InMemoryEventBus {
    /// Queue senders of live subscriptions; `None` once closed.
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<EventEnvelope>>>>,

    /// Total events published.
    events_published: AtomicU64,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
            events_published: AtomicU64::new(0),
        }
    }

    fn senders(&self) -> MutexGuard<'_, Option<Vec<mpsc::UnboundedSender<EventEnvelope>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to events matching a filter.
    ///
    /// Subscribing to a closed bus yields a subscription that is already
    /// at its end.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();

        match self.senders().as_mut() {
            Some(senders) => senders.push(sender),
            None => warn!("Subscribed to a closed event bus"),
        }

        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(receiver, filter)
    }

    /// Stop accepting events.
    ///
    /// Subscriptions keep what is already queued; `recv` returns `None` once
    /// that is drained.
    pub fn close(&self) {
        if let Some(senders) = self.senders().take() {
            info!(subscriptions = senders.len(), "Event bus closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.senders().is_none()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> usize {
        let topic = envelope.topic();
        let sequence = envelope.sequence;

        let mut guard = self.senders();
        let Some(senders) = guard.as_mut() else {
            warn!(topic = ?topic, sequence, "Event dropped (bus closed)");
            return 0;
        };

        self.events_published.fetch_add(1, Ordering::Relaxed);

        // Dropped subscriptions are pruned here.
        senders.retain(|sender| sender.send(envelope.clone()).is_ok());
        let receivers = senders.len();

        debug!(topic = ?topic, sequence, receivers, "Event published");
        receivers
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
