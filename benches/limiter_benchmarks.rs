//! Performance benchmarks for the gate's hot path.
//!
//! These benchmarks track the per-request cost the gate adds:
//! - Single-key admission decision
//! - Admission across a large, churning key space
//! - Contended admission on one key from many threads
//! - Full middleware round trip for an anonymous request

#![allow(clippy::unwrap_used)]

use std::{hint::black_box, sync::Arc, thread, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use tollgate_core::{Bandwidth, RealClock, TestClock};
use tollgate_limiter::RateLimiter;
use tollgate_testing::{TestGate, TestRequest};

fn limiter(capacity: u64) -> RateLimiter {
    let bandwidth = Bandwidth::new(capacity, capacity, Duration::from_secs(60)).unwrap();
    RateLimiter::new(bandwidth, Arc::new(RealClock::new()))
}

/// Benchmarks the decision for an existing key.
fn bench_single_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter");
    group.throughput(Throughput::Elements(1));

    let limiter = limiter(u64::MAX / 2);
    limiter.try_consume("ip:10.0.0.1");

    group.bench_function("existing_key", |b| {
        b.iter(|| black_box(limiter.try_consume(black_box("ip:10.0.0.1"))));
    });

    group.finish();
}

/// Benchmarks admission over key spaces of increasing cardinality.
fn bench_key_cardinality(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_keys");

    for keys in [100usize, 10_000, 100_000] {
        let names: Vec<String> = (0..keys)
            .map(|i| format!("ip:10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff))
            .collect();
        let limiter = limiter(1_000_000);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("keys", keys), &names, |b, names| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(limiter.try_consume(&names[i]))
            });
        });
    }

    group.finish();
}

/// Benchmarks contended admission against one bucket.
fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_contention");
    group.sample_size(20);

    for threads in [2usize, 8] {
        group.throughput(Throughput::Elements(threads as u64 * 1000));
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            let limiter = limiter(u64::MAX / 2);
            b.iter(|| {
                thread::scope(|scope| {
                    for _ in 0..threads {
                        scope.spawn(|| {
                            for _ in 0..1000 {
                                black_box(limiter.try_consume("user:shared"));
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmarks eviction sweeps over a populated registry.
fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_eviction");
    group.sample_size(20);

    group.bench_function("sweep_10k_idle", |b| {
        b.iter_batched(
            || {
                let clock = TestClock::new();
                let bandwidth = Bandwidth::new(10, 10, Duration::from_secs(60)).unwrap();
                let limiter = RateLimiter::new(bandwidth, Arc::new(clock.clone()));
                for i in 0..10_000 {
                    limiter.try_consume(&format!("ip:{i}"));
                }
                clock.advance(Duration::from_secs(600));
                limiter
            },
            |limiter| black_box(limiter.evict_idle(Duration::from_secs(600))),
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmarks the gate middleware for an anonymous request.
fn bench_gate_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let gate = TestGate::builder().bandwidth(u64::MAX / 2, 1, Duration::from_secs(60)).build();

    let mut group = c.benchmark_group("gate");
    group.throughput(Throughput::Elements(1));
    group.bench_function("anonymous_request", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(gate.send(TestRequest::get("/api/orders").peer("10.0.0.1:5000")).await.status)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_key,
    bench_key_cardinality,
    bench_contention,
    bench_eviction,
    bench_gate_round_trip
);
criterion_main!(benches);
