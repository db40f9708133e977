use std::convert::Infallible;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::FutureExt;
use scopecore::resources::ConnectionParams;
use scopecore::testing::{Probe, ProbeParams};
use scopecore::{with_scope_async_config, with_scope_config, Guard, ScopeConfig};
use scopecore_benchmarks::untracked;
use tokio::runtime::Runtime;

/// Benchmark a full sync scope with and without monitor tracking
fn bench_sync_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_scope");
    group.throughput(Throughput::Elements(1));

    for (label, config) in [("untracked", untracked()), ("tracked", ScopeConfig::default())] {
        group.bench_with_input(BenchmarkId::new("connection", label), &config, |b, config| {
            b.iter(|| {
                black_box(
                    with_scope_config(
                        ConnectionParams::new("localhost", 5432),
                        config.clone(),
                        |conn| Ok::<_, Infallible>(conn.is_active()),
                    )
                    .unwrap(),
                )
            });
        });
    }

    group.finish();
}

/// Benchmark the RAII guard against the closure form
fn bench_guard(c: &mut Criterion) {
    let params = ConnectionParams::new("localhost", 5432);
    let config = untracked();

    c.bench_function("guard_acquire_drop", |b| {
        b.iter(|| {
            let guard = Guard::acquire_with_config(&params, &config).unwrap();
            black_box(guard.is_active())
        });
    });
}

/// Benchmark nested scopes of increasing depth
fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_scopes");

    for depth in [1_usize, 4, 16] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let probe = Probe::new();
                black_box(nest(&probe, depth))
            });
        });
    }

    group.finish();
}

fn nest(probe: &Probe, depth: usize) -> usize {
    if depth == 0 {
        return 0;
    }
    with_scope_config(ProbeParams::new(format!("r{depth}"), probe), untracked(), |_| {
        Ok::<_, Infallible>(nest(probe, depth - 1) + 1)
    })
    .unwrap_or(0)
}

/// Benchmark a full async scope
fn bench_async_scope(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("async_scope_connection", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                with_scope_async_config(ConnectionParams::new("localhost", 5432), untracked(), |conn| {
                    async move { Ok::<_, Infallible>(conn.is_active()) }.boxed()
                })
                .await
                .unwrap(),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_sync_scope,
    bench_guard,
    bench_nested,
    bench_async_scope
);
criterion_main!(benches);
