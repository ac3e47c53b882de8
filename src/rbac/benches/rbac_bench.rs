//! Decision point benchmarks
//!
//! Criterion benchmarks for has_permission with and without the cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use opsplatform_rbac::{
    AdminService, EngineConfig, InMemoryStore, NewRole, RbacEngine, Scope, ScopeClass,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

async fn populated_engine(enable_cache: bool, users: usize) -> Arc<RbacEngine> {
    let config = EngineConfig {
        enable_cache,
        enable_metrics: false,
        bootstrap_admin: Some("root".to_string()),
        ..Default::default()
    };
    let engine = Arc::new(
        RbacEngine::new(config, Arc::new(InMemoryStore::new()))
            .await
            .unwrap(),
    );
    let admin = AdminService::new(engine.clone());

    let viewer = admin
        .create_role(
            "root",
            NewRole::new("viewer").with_permissions(["projects.read", "reports.read"]),
        )
        .await
        .unwrap();
    let consultant = admin
        .create_role(
            "root",
            NewRole::new("consultant")
                .with_scope_class(ScopeClass::Hospital)
                .with_permissions(["profile.read", "profile.write", "timesheets.read"]),
        )
        .await
        .unwrap();

    for i in 0..users {
        let user = format!("user-{}", i);
        admin.assign("root", &user, &viewer.id, None).await.unwrap();
        admin
            .assign(
                "root",
                &user,
                &consultant.id,
                Some(Scope::hospital(format!("H{}", i % 10))),
            )
            .await
            .unwrap();
    }

    engine
}

// ============================================================================
// DECISION LATENCY BENCHMARKS
// ============================================================================

fn bench_decision_no_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(populated_engine(false, 50));

    c.bench_function("has_permission_no_cache", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(engine.has_permission("user-7", "reports.read", None).await)
        });
    });
}

fn bench_decision_cached(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(populated_engine(true, 50));
    let scope = Scope::hospital("H7");

    // Warm up
    rt.block_on(engine.has_permission("user-7", "profile.write", Some(&scope)));

    c.bench_function("has_permission_cached", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                engine
                    .has_permission("user-7", "profile.write", Some(&scope))
                    .await,
            )
        });
    });
}

// ============================================================================
// THROUGHPUT BENCHMARKS
// ============================================================================

fn bench_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(populated_engine(true, 100));

    let mut group = c.benchmark_group("decision_throughput");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                b.to_async(&rt).iter(|| async {
                    for i in 0..batch_size {
                        let user = format!("user-{}", i % 100);
                        let scope = Scope::hospital(format!("H{}", i % 10));
                        black_box(
                            engine
                                .has_permission(&user, "timesheets.read", Some(&scope))
                                .await,
                        );
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// RESOLUTION BENCHMARKS
// ============================================================================

fn bench_effective_permissions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(populated_engine(false, 50));
    let scope = Scope::hospital("H3");

    c.bench_function("effective_permissions_resolve", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                engine
                    .effective_permissions("user-3", Some(&scope))
                    .await
                    .unwrap(),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_decision_no_cache,
    bench_decision_cached,
    bench_throughput,
    bench_effective_permissions
);
criterion_main!(benches);
