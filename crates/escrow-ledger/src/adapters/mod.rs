//! Adapters for the escrow ledger ports.

pub mod consumer_cursor;
pub mod memory_store;
pub mod outbox_relay;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_journal;

pub use consumer_cursor::ConsumerCursor;
pub use memory_store::{MemoryLedgerStore, StoreConfig};
pub use outbox_relay::{OutboxRelay, RelayConfig, RelaySignal};
#[cfg(feature = "rocksdb")]
pub use rocksdb_journal::{RocksDbConfig, RocksDbJournal};
