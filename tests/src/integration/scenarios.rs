//! # Ledger Scenarios
//!
//! The reference scenarios for the escrow engine, driven through the public
//! `EscrowApi` only.
//!
//! | Scenario | Operation | Outcome |
//! |----------|-----------|---------|
//! | A | increase budget 1000 → 1500 with 3500 available | escrow 500 |
//! | B | settle with 100 remaining at price 150 | `InsufficientBudget` |
//! | C | settle an already rejected submission | `AlreadyReviewed` |
//! | D | reject with notes "too short" | `InvalidInput` |

#[cfg(test)]
mod tests {
    use super::super::{engine_with, funded_campaign};
    use escrow_ledger::{
        CampaignStatus, EngineConfig, ErrorKind, EscrowApi, LedgerError, LedgerStore,
        NewCampaign, SubmissionStatus, TransactionType,
    };
    use rust_decimal_macros::dec;
    use shared_types::{AccountId, Currency};

    // =========================================================================
    // REFERENCE SCENARIOS
    // =========================================================================

    #[test]
    fn test_scenario_a_budget_increase() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(3500), dec!(1000), dec!(50));

        let increase = engine
            .increase_campaign_budget(advertiser, campaign.id, dec!(1500))
            .unwrap();

        let balance = engine.balance(advertiser, Currency::USD).unwrap();
        assert_eq!(balance.available, dec!(3000));
        assert_eq!(balance.pending, dec!(500));

        let campaign = engine.campaign(campaign.id).unwrap();
        assert_eq!(campaign.budget, dec!(1500));
        assert_eq!(campaign.remaining_budget, dec!(1500));

        let txs = engine.account_transactions(advertiser);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, dec!(-500));
        assert_eq!(txs[0].id, increase.transaction.id);
    }

    #[test]
    fn test_scenario_b_insufficient_budget() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(0), dec!(100), dec!(150));
        let submission = engine
            .provision_submission(campaign.id, AccountId::new())
            .unwrap();
        let outbox_before = engine.store().outbox_len();

        let err = engine
            .settle_approved_submission(advertiser, submission.id)
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientBudget {
                remaining: dec!(100),
                required: dec!(150),
            }
        );
        assert_eq!(engine.campaign(campaign.id).unwrap(), campaign);
        assert_eq!(
            engine.submission(submission.id).unwrap().status,
            SubmissionStatus::Pending
        );
        assert!(engine.campaign_transactions(campaign.id).is_empty());
        assert_eq!(engine.store().outbox_len(), outbox_before);
    }

    #[test]
    fn test_scenario_c_already_rejected() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(0), dec!(1000), dec!(150));
        let submission = engine
            .provision_submission(campaign.id, AccountId::new())
            .unwrap();
        engine
            .reject_submission(advertiser, submission.id, "music rights not cleared")
            .unwrap();

        let err = engine
            .settle_approved_submission(advertiser, submission.id)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyReviewed);
        assert_eq!(
            engine.campaign(campaign.id).unwrap().remaining_budget,
            dec!(1000)
        );
    }

    #[test]
    fn test_scenario_d_notes_too_short() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(0), dec!(1000), dec!(150));
        let submission = engine
            .provision_submission(campaign.id, AccountId::new())
            .unwrap();

        let err = engine
            .reject_submission(advertiser, submission.id, "too short")
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(
            engine.submission(submission.id).unwrap().status,
            SubmissionStatus::Pending
        );
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    #[test]
    fn test_increase_conserves_advertiser_funds() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(1000), dec!(100), dec!(10));

        let mut total = dec!(100);
        for step in [dec!(25), dec!(75.50), dec!(0.50), dec!(199)] {
            let before = engine.balance(advertiser, Currency::USD).unwrap();
            total += step;
            engine
                .increase_campaign_budget(advertiser, campaign.id, total)
                .unwrap();
            let after = engine.balance(advertiser, Currency::USD).unwrap();

            assert_eq!(before.available - after.available, step);
            assert_eq!(after.pending - before.pending, step);
            assert_eq!(before.total(), after.total());
        }
    }

    #[test]
    fn test_created_campaigns_are_backed_by_escrow() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        engine
            .seed_balance(advertiser, Currency::USD, dec!(1000))
            .unwrap();
        let create = |budget| NewCampaign {
            advertiser_id: advertiser,
            currency: Currency::USD,
            budget,
            price_per_submission: dec!(50),
            status: CampaignStatus::Active,
        };

        let first = engine.create_campaign(create(dec!(400))).unwrap().campaign;
        let second = engine.create_campaign(create(dec!(350))).unwrap().campaign;
        engine
            .increase_campaign_budget(advertiser, first.id, dec!(500))
            .unwrap();
        let refused = engine.create_campaign(create(dec!(200))).unwrap_err();
        assert_eq!(refused.kind(), ErrorKind::InsufficientFunds);

        let clipper = AccountId::new();
        for _ in 0..3 {
            let submission = engine.provision_submission(first.id, clipper).unwrap();
            engine
                .settle_approved_submission(advertiser, submission.id)
                .unwrap();
            engine.credit_clipper_payout(submission.id).unwrap();
        }

        let balance = engine.balance(advertiser, Currency::USD).unwrap();
        assert_eq!(balance.total(), dec!(1000));
        assert_eq!(balance.available, dec!(150));
        assert_eq!(balance.pending, dec!(850));

        let mut escrowed = dec!(0);
        for id in [first.id, second.id] {
            let report = engine.reconcile_campaign(id).unwrap();
            assert!(report.consistent);
            assert_eq!(report.escrowed_total, report.budget);
            escrowed += report.escrowed_total;
        }
        assert_eq!(escrowed, balance.pending);
        assert_eq!(
            engine.balance(clipper, Currency::USD).unwrap().available,
            dec!(150)
        );
    }

    #[test]
    fn test_review_is_final() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(0), dec!(1000), dec!(100));
        let submission = engine
            .provision_submission(campaign.id, AccountId::new())
            .unwrap();

        engine
            .settle_approved_submission(advertiser, submission.id)
            .unwrap();
        let again = engine.settle_approved_submission(advertiser, submission.id);
        let reject = engine.reject_submission(advertiser, submission.id, "second thoughts here");

        assert_eq!(again.unwrap_err().kind(), ErrorKind::AlreadyReviewed);
        assert_eq!(reject.unwrap_err().kind(), ErrorKind::AlreadyReviewed);

        let payouts: Vec<_> = engine
            .campaign_transactions(campaign.id)
            .into_iter()
            .filter(|tx| tx.tx_type == TransactionType::SubmissionPayout)
            .collect();
        assert_eq!(payouts.len(), 1);
    }

    #[test]
    fn test_full_campaign_lifecycle_reconciles() {
        let engine = engine_with(EngineConfig::default());
        let advertiser = AccountId::new();
        let campaign = funded_campaign(&engine, advertiser, dec!(2000), dec!(300), dec!(120));
        engine
            .increase_campaign_budget(advertiser, campaign.id, dec!(600))
            .unwrap();

        let clippers: Vec<AccountId> = (0..6).map(|_| AccountId::new()).collect();
        let mut approved = 0;
        for (i, clipper) in clippers.iter().enumerate() {
            let submission = engine.provision_submission(campaign.id, *clipper).unwrap();
            if i % 3 == 2 {
                engine
                    .reject_submission(advertiser, submission.id, "logo not visible in frame")
                    .unwrap();
                continue;
            }
            match engine.settle_approved_submission(advertiser, submission.id) {
                Ok(_) => {
                    approved += 1;
                    engine.credit_clipper_payout(submission.id).unwrap();
                }
                Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientBudget),
            }
        }

        // 600 / 120 allows five; only four were approvable.
        assert_eq!(approved, 4);
        let report = engine.reconcile_campaign(campaign.id).unwrap();
        assert!(report.consistent);
        assert_eq!(report.approved_count, 4);
        assert_eq!(report.settled_total, dec!(480));
        assert_eq!(report.remaining_budget, dec!(120));
        assert_eq!(report.escrowed_total, dec!(300));

        let credited: rust_decimal::Decimal = clippers
            .iter()
            .filter_map(|c| engine.balance(*c, Currency::USD).ok())
            .map(|b| b.available)
            .sum();
        assert_eq!(credited, dec!(480));
    }
}
