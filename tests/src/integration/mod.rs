//! Cross-crate integration tests.

pub mod choreography;
pub mod concurrency;
pub mod scenarios;

use escrow_ledger::{
    Campaign, CampaignStatus, EngineConfig, EscrowApi, EscrowEngine, MemoryLedgerStore,
    NewCampaign,
};
use rust_decimal::Decimal;
use shared_types::{AccountId, Currency};
use std::sync::Arc;

/// Engine over a fresh in-memory store.
pub fn engine_with(config: EngineConfig) -> EscrowEngine<MemoryLedgerStore> {
    EscrowEngine::new(Arc::new(MemoryLedgerStore::new()), config)
}

/// Seed `advertiser` and provision an active USD campaign for them.
pub fn funded_campaign(
    engine: &EscrowEngine<MemoryLedgerStore>,
    advertiser: AccountId,
    available: Decimal,
    budget: Decimal,
    price: Decimal,
) -> Campaign {
    if available > Decimal::ZERO {
        engine
            .seed_balance(advertiser, Currency::USD, available)
            .expect("seed balance");
    }
    engine
        .provision_campaign(NewCampaign {
            advertiser_id: advertiser,
            currency: Currency::USD,
            budget,
            price_per_submission: price,
            status: CampaignStatus::Active,
        })
        .expect("provision campaign")
}
