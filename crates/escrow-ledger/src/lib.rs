//! # Escrow Ledger
//!
//! Advertiser balances, campaign budget pools and submission settlement for
//! the clip marketplace.
//!
//! ## Architecture
//!
//! ```text
//!   campaign / review services
//!              │
//!              ▼
//!   ┌──────────────────────┐   EscrowApi (ports::inbound)
//!   │     EscrowEngine     │
//!   │  ┌────────────────┐  │
//!   │  │  UnitOfWork    │  │   reads record versions, writes are staged
//!   │  └───────┬────────┘  │
//!   └──────────┼───────────┘
//!              ▼ commit(ChangeSet)
//!   ┌──────────────────────┐   LedgerStore (ports::outbound)
//!   │  MemoryLedgerStore   │──► Journal (RocksDB, optional)
//!   │  rows + outbox       │
//!   └──────────┬───────────┘
//!              ▼ outbox_from(position)
//!   ┌──────────────────────┐
//!   │     OutboxRelay      │──► EventPublisher (shared-bus)
//!   └──────────────────────┘
//!              ▼
//!        ConsumerCursor ──► acknowledge (ConsumerOffsets)
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | No overdraw | balance read and write in one unit, version-checked at commit |
//! | No overspend | pool draw-down in the same unit as the status transition |
//! | One review per submission | terminal states refuse every transition |
//! | Payout at most once | payout marker row keyed by submission |
//! | Events only after commit | transactional outbox drained by the relay |
//! | Every consumer sees every event | outbox entries pruned only below the lowest consumer offset |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use escrow_ledger::{EscrowApi, EscrowEngine, EngineConfig, MemoryLedgerStore};
//! use std::sync::Arc;
//!
//! let engine = EscrowEngine::new(Arc::new(MemoryLedgerStore::new()), EngineConfig::default());
//! let increase = engine.increase_campaign_budget(advertiser, campaign, dec!(1500))?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{
    ConsumerCursor, MemoryLedgerStore, OutboxRelay, RelayConfig, RelaySignal, StoreConfig,
};
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbJournal};
pub use domain::{
    Balance, BudgetIncrease, Campaign, CampaignReconciliation, CampaignStatus, CommitReceipt,
    EntityKind, ErrorKind, LedgerError, LedgerTransaction, NewCampaign, PayoutMarker,
    PayoutOutcome, Rejection, Settlement, Submission, SubmissionStatus, TransactionStatus,
    TransactionType,
};
pub use ports::{
    CommitListener, ConsumerOffsets, EscrowApi, Journal, LedgerStore, SystemTimeSource, TimeSource,
};
pub use service::{EngineConfig, EscrowEngine};
