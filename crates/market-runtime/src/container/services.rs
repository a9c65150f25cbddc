//! Service construction.

use super::config::RuntimeConfig;
use escrow_ledger::{
    EscrowEngine, LedgerError, LedgerStore, MemoryLedgerStore, OutboxRelay, RelaySignal,
};
use shared_bus::{EventPublisher, InMemoryEventBus};
use std::sync::Arc;
use tracing::info;

/// Engine type used by the runtime. Durability is a journal behind the same
/// store, so the type does not change with the storage feature.
pub type Engine = EscrowEngine<MemoryLedgerStore>;

/// Central container holding the service instances.
pub struct ServiceContainer {
    pub config: RuntimeConfig,
    pub store: Arc<MemoryLedgerStore>,
    pub engine: Arc<Engine>,
    pub bus: Arc<InMemoryEventBus>,
    relay_signal: Arc<RelaySignal>,
}

impl ServiceContainer {
    /// Open the store and wire the engine to the relay signal.
    pub fn new(config: RuntimeConfig) -> Result<Self, LedgerError> {
        let store = Arc::new(open_store(&config)?);
        let relay_signal = Arc::new(RelaySignal::new());
        let engine = Arc::new(
            EscrowEngine::new(Arc::clone(&store), config.engine_config())
                .with_commit_listener(relay_signal.clone()),
        );
        let bus = Arc::new(InMemoryEventBus::new());

        info!(
            durable = config.storage.durable,
            retained = store.outbox_len(),
            "Service container ready"
        );

        Ok(Self {
            config,
            store,
            engine,
            bus,
            relay_signal,
        })
    }

    /// A relay draining this container's outbox onto its bus.
    #[must_use]
    pub fn outbox_relay(&self) -> OutboxRelay<MemoryLedgerStore> {
        let publisher: Arc<dyn EventPublisher> = self.bus.clone();
        OutboxRelay::new(
            Arc::clone(&self.store),
            publisher,
            Arc::clone(&self.relay_signal),
            self.config.relay_config(),
        )
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(config: &RuntimeConfig) -> Result<MemoryLedgerStore, LedgerError> {
    use escrow_ledger::{RocksDbConfig, RocksDbJournal};

    if !config.storage.durable {
        return Ok(MemoryLedgerStore::with_config(config.store_config()));
    }

    let journal = RocksDbJournal::open(RocksDbConfig {
        path: config.storage.data_dir.to_string_lossy().to_string(),
        ..RocksDbConfig::default()
    })?;
    MemoryLedgerStore::with_journal(Arc::new(journal), config.store_config())
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(config: &RuntimeConfig) -> Result<MemoryLedgerStore, LedgerError> {
    if config.storage.durable {
        return Err(LedgerError::Storage(
            "durable storage requires the rocksdb feature".to_string(),
        ));
    }
    Ok(MemoryLedgerStore::with_config(config.store_config()))
}
