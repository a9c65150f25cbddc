//! Campaign budget tracker.
//!
//! Both operations take the open [`UnitOfWork`], so budget arithmetic can
//! only happen inside an atomic unit and commits together with the balance
//! and transaction rows that justify it.

use super::entities::Campaign;
use super::errors::LedgerError;
use super::unit_of_work::UnitOfWork;
use shared_types::{Amount, CampaignId};

pub struct BudgetTracker;

impl BudgetTracker {
    /// Raise `budget` and `remaining_budget` by the same `delta`.
    pub fn increase_budget(
        uow: &mut UnitOfWork<'_>,
        campaign_id: CampaignId,
        delta: Amount,
    ) -> Result<Campaign, LedgerError> {
        if delta <= Amount::ZERO {
            return Err(LedgerError::invalid_amount(delta, "budget increase must be positive"));
        }

        let mut campaign = uow.campaign(campaign_id)?;
        campaign.raise_budget(delta)?;
        uow.put_campaign(campaign.clone());
        Ok(campaign)
    }

    /// Take `amount` out of the remaining pool.
    pub fn draw_down(
        uow: &mut UnitOfWork<'_>,
        campaign_id: CampaignId,
        amount: Amount,
    ) -> Result<Campaign, LedgerError> {
        if amount <= Amount::ZERO {
            return Err(LedgerError::invalid_amount(amount, "draw-down must be positive"));
        }

        let mut campaign = uow.campaign(campaign_id)?;
        if campaign.remaining_budget < amount {
            return Err(LedgerError::InsufficientBudget {
                remaining: campaign.remaining_budget,
                required: amount,
            });
        }
        campaign.remaining_budget -= amount;
        uow.put_campaign(campaign.clone());
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryLedgerStore;
    use crate::domain::entities::CampaignStatus;
    use crate::ports::outbound::{LedgerStore, RowReader};
    use rust_decimal_macros::dec;
    use shared_types::{AccountId, Currency};

    fn seeded(remaining: Amount) -> (MemoryLedgerStore, CampaignId) {
        let store = MemoryLedgerStore::new();
        let campaign = Campaign {
            id: CampaignId::new(),
            advertiser_id: AccountId::new(),
            currency: Currency::USD,
            budget: dec!(1000),
            remaining_budget: remaining,
            price_per_submission: dec!(150),
            status: CampaignStatus::Active,
        };
        let id = campaign.id;
        let mut uow = UnitOfWork::new(&store, chrono::Utc::now());
        uow.put_campaign(campaign);
        store.commit(uow.into_changes()).unwrap();
        (store, id)
    }

    #[test]
    fn test_increase_moves_both_fields() {
        let (store, id) = seeded(dec!(1000));
        let mut uow = UnitOfWork::new(&store, chrono::Utc::now());

        let campaign = BudgetTracker::increase_budget(&mut uow, id, dec!(500)).unwrap();
        assert_eq!(campaign.budget, dec!(1500));
        assert_eq!(campaign.remaining_budget, dec!(1500));

        // Nothing visible until commit.
        assert_eq!(store.read_campaign(id).unwrap().row.budget, dec!(1000));
        store.commit(uow.into_changes()).unwrap();
        assert_eq!(store.read_campaign(id).unwrap().row.budget, dec!(1500));
    }

    #[test]
    fn test_increase_rejects_non_positive_delta() {
        let (store, id) = seeded(dec!(1000));
        let mut uow = UnitOfWork::new(&store, chrono::Utc::now());

        assert!(matches!(
            BudgetTracker::increase_budget(&mut uow, id, dec!(0)),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_draw_down_exact_remaining() {
        let (store, id) = seeded(dec!(150));
        let mut uow = UnitOfWork::new(&store, chrono::Utc::now());

        let campaign = BudgetTracker::draw_down(&mut uow, id, dec!(150)).unwrap();
        assert_eq!(campaign.remaining_budget, dec!(0));
        assert_eq!(campaign.budget, dec!(1000));
    }

    #[test]
    fn test_draw_down_insufficient() {
        let (store, id) = seeded(dec!(100));
        let mut uow = UnitOfWork::new(&store, chrono::Utc::now());

        let err = BudgetTracker::draw_down(&mut uow, id, dec!(150)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBudget {
                remaining: dec!(100),
                required: dec!(150),
            }
        );
        assert!(uow.into_changes().campaigns.is_empty());
    }
}
