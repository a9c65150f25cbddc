//! Runtime lifecycle: start consumers and the relay, shut them down.

use crate::container::services::Engine;
use crate::container::{RuntimeConfig, ServiceContainer};
use crate::handlers::{
    audit, notification, payout, AuditHandler, AuditSink, ConsumerFeed, LoggingNotificationSink,
    NotificationHandler, NotificationSink, PayoutHandler, TracingAuditSink,
};
use escrow_ledger::{ConsumerCursor, ConsumerOffsets, EscrowApi, LedgerError, LedgerStore};
use parking_lot::Mutex;
use shared_bus::{EventFilter, EventPublisher, EventTopic, InMemoryEventBus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External sinks the consumers write to.
pub struct Sinks {
    pub notifications: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            notifications: Arc::new(LoggingNotificationSink),
            audit: Arc::new(TracingAuditSink),
        }
    }
}

/// The market runtime orchestrating the engine and its consumers.
///
/// Shutdown stops the relay first, which drains the outbox onto the bus.
/// Closing the bus then lets every consumer finish its queue and save its
/// cursor before it exits.
pub struct MarketRuntime {
    container: Arc<ServiceContainer>,
    relay_shutdown: watch::Sender<bool>,
    relay_task: Mutex<Option<JoinHandle<()>>>,
    consumer_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketRuntime {
    /// Open the ledger and build the services.
    pub fn new(config: RuntimeConfig) -> Result<Self, LedgerError> {
        info!("Creating clip market runtime");
        let container = Arc::new(ServiceContainer::new(config)?);
        let (relay_shutdown, _) = watch::channel(false);

        Ok(Self {
            container,
            relay_shutdown,
            relay_task: Mutex::new(None),
            consumer_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start consumers and the outbox relay.
    ///
    /// Consumers resume their stored cursors and subscribe before the relay
    /// starts, so events a previous run left unhandled reach them too.
    pub fn start(&self, sinks: Sinks) -> Result<(), LedgerError> {
        let container = &self.container;
        let offsets: Arc<dyn ConsumerOffsets> = container.store.clone();
        let feed = |consumer: &str, topics: Vec<EventTopic>| -> Result<ConsumerFeed, LedgerError> {
            let cursor = ConsumerCursor::register(Arc::clone(&offsets), consumer)?;
            Ok(ConsumerFeed::new(
                container.bus.subscribe(EventFilter::topics(topics)),
                cursor,
            ))
        };

        let notifier = NotificationHandler::new(
            feed(
                notification::CONSUMER,
                vec![EventTopic::Escrow, EventTopic::Review, EventTopic::Payout],
            )?,
            sinks.notifications,
        );
        let auditor = AuditHandler::new(
            feed(audit::CONSUMER, vec![EventTopic::Audit])?,
            sinks.audit,
        );
        let api: Arc<dyn EscrowApi> = container.engine.clone();
        let dead_letters: Arc<dyn EventPublisher> = container.bus.clone();
        let payer = PayoutHandler::new(
            feed(payout::CONSUMER, vec![EventTopic::Review])?,
            api,
            dead_letters,
        );

        self.spawn_consumer(notification::CONSUMER, notifier.run());
        self.spawn_consumer(audit::CONSUMER, auditor.run());
        self.spawn_consumer(payout::CONSUMER, payer.run());

        let relay = container.outbox_relay();
        let handle = tokio::spawn(relay.run(self.relay_shutdown.subscribe()));
        *self.relay_task.lock() = Some(handle);

        info!(
            retained = container.store.outbox_len(),
            "Consumers and outbox relay started"
        );
        Ok(())
    }

    fn spawn_consumer<F>(&self, name: &'static str, handler: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            handler.await;
            debug!(consumer = name, "Consumer finished");
        });
        self.consumer_tasks.lock().push(handle);
    }

    /// Stop the relay after its final drain, close the bus, then wait for
    /// the consumers to work through what they were sent. Each wait is
    /// bounded by the configured grace period.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        let grace = self.container.config.shutdown_grace();

        if self.relay_shutdown.send(true).is_err() {
            debug!("Relay was not running");
        }
        let relay = self.relay_task.lock().take();
        if let Some(task) = relay {
            join_within(task, grace).await;
        }

        self.container.bus.close();
        let consumers = std::mem::take(&mut *self.consumer_tasks.lock());
        for task in consumers {
            join_within(task, grace).await;
        }

        // Commits made by consumers after the final drain wait in the
        // outbox for the next start.
        info!(
            retained = self.container.store.outbox_len(),
            "Shutdown complete"
        );
    }

    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.container.engine)
    }

    #[must_use]
    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.container.bus)
    }

    #[must_use]
    pub fn container(&self) -> Arc<ServiceContainer> {
        Arc::clone(&self.container)
    }
}

async fn join_within(task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Task ended abnormally"),
        Err(_) => warn!(?grace, "Task did not stop within the grace period"),
    }
}
