//! # Event Choreography
//!
//! The runtime publishes ledger events from the outbox, after commit, in
//! sequence order. These tests watch the bus from the outside.

#[cfg(test)]
mod tests {
    use escrow_ledger::{CampaignStatus, EscrowApi, LedgerError, NewCampaign};
    use market_runtime::{MarketRuntime, RuntimeConfig, Sinks};
    use rust_decimal_macros::dec;
    use shared_bus::{
        EventEnvelope, EventFilter, EventPublisher, EventTopic, MarketEvent, Subscription,
    };
    use shared_types::{AccountId, Currency};
    use std::time::Duration;

    async fn next(sub: &mut Subscription) -> EventEnvelope {
        tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no event within 5s")
            .expect("bus closed")
    }

    async fn quiet(sub: &mut Subscription) -> bool {
        tokio::time::timeout(Duration::from_millis(300), sub.recv())
            .await
            .is_err()
    }

    fn active(advertiser: AccountId) -> NewCampaign {
        NewCampaign {
            advertiser_id: advertiser,
            currency: Currency::USD,
            budget: dec!(100),
            price_per_submission: dec!(25),
            status: CampaignStatus::Active,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_events_follow_commits() {
        let runtime = MarketRuntime::new(RuntimeConfig::default()).unwrap();
        let mut escrow = runtime
            .bus()
            .subscribe(EventFilter::topics(vec![EventTopic::Escrow]));
        runtime.start(Sinks::default()).unwrap();

        let engine = runtime.engine();
        let advertiser = AccountId::new();
        engine
            .seed_balance(advertiser, Currency::USD, dec!(300))
            .unwrap();
        let campaign = engine.provision_campaign(active(advertiser)).unwrap();
        engine
            .increase_campaign_budget(advertiser, campaign.id, dec!(250))
            .unwrap();

        let envelope = next(&mut escrow).await;
        let MarketEvent::BudgetEscrowed {
            campaign_id,
            delta,
            new_budget,
            ..
        } = envelope.event
        else {
            panic!("expected an escrow event");
        };
        assert_eq!(campaign_id, campaign.id);
        assert_eq!(delta, dec!(150));
        assert_eq!(new_budget, dec!(250));

        // By the time the event is visible the ledger already shows it.
        assert_eq!(engine.campaign(campaign.id).unwrap().budget, dec!(250));
        let balance = engine.balance(advertiser, Currency::USD).unwrap();
        assert_eq!(balance.pending, dec!(150));

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_operations_publish_nothing() {
        let runtime = MarketRuntime::new(RuntimeConfig::default()).unwrap();
        let mut all = runtime.bus().subscribe(EventFilter::all());
        runtime.start(Sinks::default()).unwrap();

        let engine = runtime.engine();
        let advertiser = AccountId::new();
        engine
            .seed_balance(advertiser, Currency::USD, dec!(50))
            .unwrap();
        let campaign = engine.provision_campaign(active(advertiser)).unwrap();

        let err = engine
            .increase_campaign_budget(advertiser, campaign.id, dec!(500))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let submission = engine
            .provision_submission(campaign.id, AccountId::new())
            .unwrap();
        let err = engine
            .reject_submission(advertiser, submission.id, "meh")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        let stranger = AccountId::new();
        let err = engine
            .settle_approved_submission(stranger, submission.id)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));

        assert!(quiet(&mut all).await);
        assert_eq!(runtime.bus().events_published(), 0);

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sequences_are_monotonic() {
        let runtime = MarketRuntime::new(RuntimeConfig::default()).unwrap();
        let mut ledger_events = runtime.bus().subscribe(EventFilter::topics(vec![
            EventTopic::Escrow,
            EventTopic::Review,
            EventTopic::Audit,
        ]));
        runtime.start(Sinks::default()).unwrap();

        let engine = runtime.engine();
        let advertiser = AccountId::new();
        engine
            .seed_balance(advertiser, Currency::USD, dec!(1000))
            .unwrap();
        let campaign = engine.provision_campaign(active(advertiser)).unwrap();
        for total in [dec!(200), dec!(300), dec!(400)] {
            engine
                .increase_campaign_budget(advertiser, campaign.id, total)
                .unwrap();
        }
        for _ in 0..3 {
            let submission = engine
                .provision_submission(campaign.id, AccountId::new())
                .unwrap();
            engine
                .settle_approved_submission(advertiser, submission.id)
                .unwrap();
        }

        // 3 increases and 3 settlements, each with its audit record. Payouts
        // add their own events, which may interleave.
        let mut sequences = Vec::new();
        let mut escrows = 0;
        let mut settlements = 0;
        while escrows < 3 || settlements < 3 {
            let envelope = next(&mut ledger_events).await;
            match envelope.event {
                MarketEvent::BudgetEscrowed { .. } => escrows += 1,
                MarketEvent::SubmissionSettled { .. } => settlements += 1,
                _ => {}
            }
            sequences.push(envelope.sequence);
        }

        assert!(
            sequences.windows(2).all(|w| w[0] < w[1]),
            "out of order: {sequences:?}"
        );
        assert_eq!(sequences[0], 0);

        runtime.shutdown().await;
    }
}
