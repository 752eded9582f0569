// Criterion benchmarks for Arena Vote

use arena_vote::core::{leaderboard::rank_by_win_rate, mint_nonce, MatchmakingOptions, MatchmakingService, NonceLedger};
use arena_vote::models::{Character, CharacterPair, VisitorId};
use arena_vote::services::InMemoryEntityStore;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn create_roster(size: usize) -> Vec<Character> {
    (0..size)
        .map(|i| {
            let mut c = Character::new(i.to_string(), format!("Pilot {}", i));
            c.wins = (i * 7 % 100) as u64;
            c.losses = (i * 13 % 100) as u64;
            c
        })
        .collect()
}

fn bench_mint_nonce(c: &mut Criterion) {
    c.bench_function("mint_nonce", |b| b.iter(|| black_box(mint_nonce())));
}

fn bench_nonce_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("nonce_ledger");

    for capacity in [1_000, 100_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("issue_consume", capacity),
            capacity,
            |b, &capacity| {
                let mut ledger = NonceLedger::with_capacity(capacity);
                let pair = CharacterPair::new("1", "2");
                let visitor = VisitorId::from("10.0.0.1");
                b.iter(|| {
                    let token = ledger.issue(visitor.clone(), pair.clone(), 0);
                    black_box(ledger.consume(&token))
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("issue_at_capacity", capacity),
            capacity,
            |b, &capacity| {
                let mut ledger = NonceLedger::with_capacity(capacity);
                let pair = CharacterPair::new("1", "2");
                for i in 0..capacity {
                    ledger.issue(VisitorId::new(i.to_string()), pair.clone(), 0);
                }
                let visitor = VisitorId::from("10.0.0.1");
                b.iter(|| black_box(ledger.issue(visitor.clone(), pair.clone(), 0)))
            },
        );
    }

    group.finish();
}

fn bench_next_pair(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("next_pair");

    for size in [100, 10_000].iter() {
        let store = Arc::new(InMemoryEntityStore::with_characters(create_roster(*size)));
        let service = MatchmakingService::new(store, MatchmakingOptions::default());
        rt.block_on(service.warm_up()).unwrap();

        group.bench_with_input(BenchmarkId::new("sticky", size), size, |b, _| {
            let visitor = VisitorId::from("10.0.0.1");
            b.iter(|| rt.block_on(service.next_pair(black_box(&visitor))).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("fresh_visitor", size), size, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let visitor = VisitorId::new(format!("10.{}.{}.{}", i >> 16, (i >> 8) & 255, i & 255));
                rt.block_on(service.next_pair(&visitor)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_vote_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(InMemoryEntityStore::with_characters(create_roster(1_000)));
    let service = MatchmakingService::new(store, MatchmakingOptions::default());

    c.bench_function("pair_then_vote", |b| {
        let visitor = VisitorId::from("10.0.0.1");
        b.iter(|| {
            rt.block_on(async {
                let issued = service.next_pair(&visitor).await.unwrap();
                let [winner, loser] = issued.pair.ids();
                service
                    .record_vote(winner, loser, &issued.nonce, &visitor)
                    .await
                    .unwrap()
            })
        })
    });
}

fn bench_rank_by_win_rate(c: &mut Criterion) {
    let roster = create_roster(100);
    c.bench_function("rank_by_win_rate_100", |b| {
        b.iter(|| rank_by_win_rate(black_box(roster.clone())))
    });
}

criterion_group!(
    benches,
    bench_mint_nonce,
    bench_nonce_ledger,
    bench_next_pair,
    bench_vote_round_trip,
    bench_rank_by_win_rate
);
criterion_main!(benches);
