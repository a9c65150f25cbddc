//! # Concurrency
//!
//! Many threads race units of work against the same balances and campaign
//! pools. After the dust settles every ledger invariant must hold and the
//! transaction trail must explain every balance.

#[cfg(test)]
mod tests {
    use super::super::{engine_with, funded_campaign};
    use escrow_ledger::{
        EngineConfig, ErrorKind, EscrowApi, LedgerError, LedgerStore, SubmissionStatus,
        TransactionType,
    };
    use rand::Rng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use shared_types::{AccountId, Currency};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn patient() -> EngineConfig {
        EngineConfig {
            max_conflict_retries: 200,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_racing_increases_on_one_balance() {
        let engine = engine_with(patient());
        let advertiser = AccountId::new();
        let campaigns: Vec<_> = (0..4)
            .map(|i| {
                funded_campaign(
                    &engine,
                    advertiser,
                    if i == 0 { dec!(1000) } else { dec!(0) },
                    dec!(10),
                    dec!(1),
                )
            })
            .collect();

        // 4 threads x 30 increases of 10 each want 1200; only 1000 exists.
        let succeeded = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for campaign in &campaigns {
                let engine = &engine;
                let succeeded = &succeeded;
                s.spawn(move || {
                    for step in 1..=30 {
                        let total = dec!(10) + Decimal::from(step * 10);
                        match engine.increase_campaign_budget(advertiser, campaign.id, total) {
                            Ok(_) => {
                                succeeded.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(LedgerError::InsufficientFunds { .. }) => break,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                });
            }
        });

        assert_eq!(succeeded.load(Ordering::SeqCst), 100);
        let balance = engine.balance(advertiser, Currency::USD).unwrap();
        assert_eq!(balance.available, dec!(0));
        assert_eq!(balance.pending, dec!(1000));

        let escrowed: Decimal = engine
            .account_transactions(advertiser)
            .iter()
            .map(|tx| -tx.amount)
            .sum();
        assert_eq!(escrowed, dec!(1000));
    }

    #[test]
    fn test_racing_reviews_on_one_pool() {
        let engine = engine_with(patient());
        let advertiser = AccountId::new();
        // Pool pays for exactly 7 of 20 submissions.
        let campaign = funded_campaign(&engine, advertiser, dec!(0), dec!(70), dec!(10));
        let submissions: Vec<_> = (0..20)
            .map(|_| {
                engine
                    .provision_submission(campaign.id, AccountId::new())
                    .unwrap()
            })
            .collect();

        std::thread::scope(|s| {
            for chunk in submissions.chunks(5) {
                let engine = &engine;
                s.spawn(move || {
                    for submission in chunk {
                        let result = engine.settle_approved_submission(advertiser, submission.id);
                        if let Err(e) = result {
                            assert_eq!(e.kind(), ErrorKind::InsufficientBudget);
                            engine
                                .reject_submission(
                                    advertiser,
                                    submission.id,
                                    "campaign budget exhausted",
                                )
                                .unwrap();
                        }
                    }
                });
            }
        });

        let all = engine.campaign_submissions(campaign.id);
        let approved = all
            .iter()
            .filter(|s| matches!(s.status, SubmissionStatus::Approved { .. }))
            .count();
        let rejected = all
            .iter()
            .filter(|s| matches!(s.status, SubmissionStatus::Rejected { .. }))
            .count();
        assert_eq!(approved, 7);
        assert_eq!(rejected, 13);

        let report = engine.reconcile_campaign(campaign.id).unwrap();
        assert!(report.consistent);
        assert_eq!(report.remaining_budget, dec!(0));
    }

    #[test]
    fn test_random_mixed_workload_keeps_invariants() {
        let engine = engine_with(patient());
        let advertisers: Vec<AccountId> = (0..3).map(|_| AccountId::new()).collect();
        let campaigns: Vec<_> = advertisers
            .iter()
            .flat_map(|a| {
                let first = funded_campaign(&engine, *a, dec!(5000), dec!(100), dec!(15));
                let second = funded_campaign(&engine, *a, dec!(0), dec!(50), dec!(20));
                [first, second]
            })
            .collect();

        std::thread::scope(|s| {
            for _ in 0..8 {
                let engine = &engine;
                let campaigns = &campaigns;
                s.spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..60 {
                        let campaign = &campaigns[rng.gen_range(0..campaigns.len())];
                        let advertiser = campaign.advertiser_id;
                        match rng.gen_range(0..3) {
                            0 => {
                                let current = engine.campaign(campaign.id).unwrap().budget;
                                let bump = Decimal::from(rng.gen_range(1..200u32));
                                let _ = engine.increase_campaign_budget(
                                    advertiser,
                                    campaign.id,
                                    current + bump,
                                );
                            }
                            1 => {
                                let submission = engine
                                    .provision_submission(campaign.id, AccountId::new())
                                    .unwrap();
                                if engine
                                    .settle_approved_submission(advertiser, submission.id)
                                    .is_ok()
                                {
                                    let _ = engine.credit_clipper_payout(submission.id);
                                }
                            }
                            _ => {
                                let submission = engine
                                    .provision_submission(campaign.id, AccountId::new())
                                    .unwrap();
                                engine
                                    .reject_submission(
                                        advertiser,
                                        submission.id,
                                        "does not match the brief",
                                    )
                                    .unwrap();
                            }
                        }
                    }
                });
            }
        });

        let store = engine.store();
        for balance in store.all_balances() {
            assert!(balance.available >= Decimal::ZERO, "{balance:?}");
            assert!(balance.pending >= Decimal::ZERO, "{balance:?}");
        }
        for campaign in store.all_campaigns() {
            assert!(campaign.remaining_budget >= Decimal::ZERO);
            assert!(campaign.remaining_budget <= campaign.budget);
            assert!(engine.reconcile_campaign(campaign.id).unwrap().consistent);
        }
        for advertiser in &advertisers {
            let balance = engine.balance(*advertiser, Currency::USD).unwrap();
            assert_eq!(balance.total(), dec!(5000));
            let escrowed: Decimal = engine
                .account_transactions(*advertiser)
                .iter()
                .filter(|tx| tx.tx_type == TransactionType::BudgetEscrow)
                .map(|tx| -tx.amount)
                .sum();
            assert_eq!(escrowed, balance.pending);
        }
        // Every committed event is still queued, nothing for failed work.
        assert!(store.outbox_len() > 0);
    }
}
