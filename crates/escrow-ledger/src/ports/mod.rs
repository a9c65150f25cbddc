//! Ports (hexagonal boundaries) of the escrow ledger.

pub mod inbound;
pub mod outbound;

pub use inbound::EscrowApi;
pub use outbound::{
    CampaignLedger, CommitListener, ConsumerOffsets, Journal, JournalBatch, LedgerStore, RowReader,
    SystemTimeSource, TimeSource,
};
