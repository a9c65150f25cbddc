//! # Outbox Relay
//!
//! Moves committed events from the store's outbox onto the event bus.
//!
//! ```text
//! commit ──► outbox (in store) ──► relay ──► EventPublisher ──► consumers
//!                 ▲                                                │
//!                 └──────────── ConsumerCursor::advance ◄──────────┘
//! ```
//!
//! The relay only tracks how far it has published. Entries leave the
//! outbox when every consumer cursor has passed them, so delivery is
//! at-least-once: a relay that restarts publishes everything still
//! retained again, with the same `event_id`. The relay never runs inside a
//! commit, so a slow bus cannot hold up ledger writes.

use crate::domain::unit_of_work::CommitReceipt;
use crate::ports::outbound::{CommitListener, LedgerStore};
use market_telemetry::{OUTBOX_BACKLOG, OUTBOX_PUBLISHED};
use shared_bus::EventPublisher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Outbox entries read per round trip.
    pub batch_size: usize,
    /// Fallback poll when no commit signal arrives.
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Wakes the relay after commits that staged events.
///
/// Install on the engine with `with_commit_listener`.
#[derive(Debug, Default)]
pub struct RelaySignal {
    notify: Notify,
}

impl RelaySignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next commit. A commit that happened since the last wait
    /// completes this immediately.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl CommitListener for RelaySignal {
    fn committed(&self, _receipt: &CommitReceipt) {
        self.notify.notify_one();
    }
}

/// Drains the outbox into an [`EventPublisher`].
pub struct OutboxRelay<S: LedgerStore> {
    store: Arc<S>,
    publisher: Arc<dyn EventPublisher>,
    signal: Arc<RelaySignal>,
    config: RelayConfig,
    /// Next sequence to publish.
    position: AtomicU64,
}

impl<S: LedgerStore> OutboxRelay<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        signal: Arc<RelaySignal>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            signal,
            config,
            position: AtomicU64::new(0),
        }
    }

    /// Next sequence the relay will publish.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Publish everything committed since the last drain.
    ///
    /// Returns the number of entries published.
    pub async fn drain(&self) -> usize {
        let batch_size = self.config.batch_size.max(1);
        let mut published = 0;

        loop {
            let batch = self.store.outbox_from(self.position(), batch_size);
            if batch.is_empty() {
                break;
            }
            let full = batch.len() == batch_size;

            for envelope in batch {
                let next = envelope.sequence + 1;
                self.publisher.publish(envelope).await;
                self.position.store(next, Ordering::Release);
                OUTBOX_PUBLISHED.inc();
                published += 1;
            }

            if !full {
                break;
            }
        }

        OUTBOX_BACKLOG.set(self.store.outbox_len() as f64);
        if published > 0 {
            debug!(published, position = self.position(), "Outbox drained");
        }
        published
    }

    /// Relay until `shutdown` flips to `true`, then drain one last time.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox relay started"
        );

        loop {
            self.drain().await;

            tokio::select! {
                () = self.signal.notified() => {}
                () = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain().await;
        info!(
            position = self.position(),
            retained = self.store.outbox_len(),
            "Outbox relay stopped"
        );
    }
}
