//! # Escrow Ledger Benchmarks
//!
//! | Operation | Path measured |
//! |-----------|---------------|
//! | Budget increase | validate, escrow delta, stage outbox, commit |
//! | Settlement | authorize, draw down pool, approve, commit |
//! | Payout | marker check, credit clipper, commit |
//! | Outbox read and prune | ranged read, consumer acknowledge, prune |
//! | Contended increase | optimistic retry under thread contention |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use escrow_ledger::{
    CampaignStatus, ConsumerOffsets, EngineConfig, EscrowApi, EscrowEngine, LedgerStore,
    MemoryLedgerStore, NewCampaign,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shared_types::{AccountId, CampaignId, Currency};
use std::sync::Arc;
use std::time::Duration;

type Engine = EscrowEngine<MemoryLedgerStore>;

fn engine() -> Engine {
    EscrowEngine::new(
        Arc::new(MemoryLedgerStore::new()),
        EngineConfig {
            max_conflict_retries: 1_000,
            ..EngineConfig::default()
        },
    )
}

fn campaign(engine: &Engine, advertiser: AccountId, funds: Decimal, budget: Decimal) -> CampaignId {
    engine
        .seed_balance(advertiser, Currency::USD, funds)
        .expect("seed");
    engine
        .provision_campaign(NewCampaign {
            advertiser_id: advertiser,
            currency: Currency::USD,
            budget,
            price_per_submission: dec!(1),
            status: CampaignStatus::Active,
        })
        .expect("campaign")
        .id
}

// ============================================================================
// Single-threaded operations
// ============================================================================

fn bench_budget_increase(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget-increase");
    group.measurement_time(Duration::from_secs(5));

    let engine = engine();
    let advertiser = AccountId::new();
    let id = campaign(&engine, advertiser, dec!(1_000_000_000), dec!(1));
    let mut total = dec!(1);

    group.bench_function("increase_by_one", |b| {
        b.iter(|| {
            total += dec!(1);
            black_box(
                engine
                    .increase_campaign_budget(advertiser, id, total)
                    .expect("increase"),
            )
        })
    });

    group.finish();
}

fn bench_settle_and_payout(c: &mut Criterion) {
    let mut group = c.benchmark_group("review");
    group.measurement_time(Duration::from_secs(5));

    let engine = engine();
    let advertiser = AccountId::new();
    let id = campaign(&engine, advertiser, dec!(1), dec!(1_000_000_000));

    group.bench_function("settle", |b| {
        b.iter_batched(
            || {
                engine
                    .provision_submission(id, AccountId::new())
                    .expect("submission")
                    .id
            },
            |submission| {
                black_box(
                    engine
                        .settle_approved_submission(advertiser, submission)
                        .expect("settle"),
                )
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("settle_then_payout", |b| {
        b.iter_batched(
            || {
                engine
                    .provision_submission(id, AccountId::new())
                    .expect("submission")
                    .id
            },
            |submission| {
                engine
                    .settle_approved_submission(advertiser, submission)
                    .expect("settle");
                black_box(engine.credit_clipper_payout(submission).expect("payout"))
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_outbox_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbox");

    for backlog in [64usize, 512] {
        group.throughput(Throughput::Elements(backlog as u64));
        group.bench_with_input(BenchmarkId::new("read_and_prune", backlog), &backlog, |b, &n| {
            b.iter_batched(
                || {
                    let engine = engine();
                    engine.store().register_consumer("bench").expect("register");
                    let advertiser = AccountId::new();
                    let id = campaign(&engine, advertiser, dec!(1_000_000), dec!(1));
                    // Each increase queues two events.
                    for step in 1..=(n / 2) {
                        engine
                            .increase_campaign_budget(advertiser, id, Decimal::from(step + 1))
                            .expect("increase");
                    }
                    engine
                },
                |engine| {
                    let store = engine.store();
                    let pending = store.outbox_from(0, n);
                    let last = pending.last().map_or(0, |e| e.sequence);
                    black_box(store.acknowledge("bench", last).expect("acknowledge"))
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Contention
// ============================================================================

fn bench_contended_increase(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for threads in [2usize, 4, 8] {
        let ops_per_thread = 50usize;
        group.throughput(Throughput::Elements((threads * ops_per_thread) as u64));
        group.bench_with_input(
            BenchmarkId::new("shared_balance", threads),
            &threads,
            |b, &threads| {
                b.iter_batched(
                    || {
                        let engine = engine();
                        let advertiser = AccountId::new();
                        let campaigns: Vec<CampaignId> = (0..threads)
                            .map(|i| {
                                let funds = if i == 0 { dec!(1_000_000) } else { dec!(0.01) };
                                campaign(&engine, advertiser, funds, dec!(1))
                            })
                            .collect();
                        (engine, advertiser, campaigns)
                    },
                    |(engine, advertiser, campaigns)| {
                        std::thread::scope(|s| {
                            for id in &campaigns {
                                let engine = &engine;
                                s.spawn(move || {
                                    for step in 1..=ops_per_thread {
                                        engine
                                            .increase_campaign_budget(
                                                advertiser,
                                                *id,
                                                Decimal::from(step + 1),
                                            )
                                            .expect("increase");
                                    }
                                });
                            }
                        });
                        black_box(engine.store().outbox_len())
                    },
                    criterion::BatchSize::PerIteration,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_budget_increase,
    bench_settle_and_payout,
    bench_outbox_drain,
    bench_contended_increase,
);

criterion_main!(benches);
