use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_registry::*;
use std::sync::Arc;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let registry = ServiceRegistry::new();
    registry.register(ServiceDescriptor::instance("answer", 42u64)).unwrap();

    // Prime the singleton
    let _ = registry.require::<u64>("answer").unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = registry.require::<u64>(black_box("answer")).unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let registry = ServiceRegistry::new();
                registry
                    .register(ServiceDescriptor::singleton("expensive", |_| {
                        Ok(ExpensiveToCreate {
                            data: (0..1000).collect(),
                        })
                    }))
                    .unwrap();
                registry
            },
            |registry| {
                let v = registry.require::<ExpensiveToCreate>("expensive").unwrap();
                black_box(v.data.len());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_scoped_vs_transient(c: &mut Criterion) {
    struct Payload {
        data: [u8; 64],
    }

    let mut group = c.benchmark_group("scoped_vs_transient");

    let registry = ServiceRegistry::new();
    registry
        .register(ServiceDescriptor::scoped("scoped", |_| Ok(Payload { data: [0; 64] })))
        .unwrap();
    registry
        .register(ServiceDescriptor::transient("transient", |_| Ok(Payload { data: [0; 64] })))
        .unwrap();
    let scope = registry.create_scope(Some("bench"), None).unwrap();
    let _ = scope.require::<Payload>("scoped").unwrap();

    group.bench_function("scoped_hit", |b| {
        b.iter(|| {
            let v = scope.require::<Payload>("scoped").unwrap();
            black_box(v.data[0]);
        })
    });

    group.bench_function("transient", |b| {
        b.iter(|| {
            let v = registry.require::<Payload>("transient").unwrap();
            black_box(v.data[0]);
        })
    });

    group.finish();
}

fn bench_scope_lifecycle(c: &mut Criterion) {
    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::scoped("session", |ctx| Ok(ctx.scope_name().to_string()))
                .on_close(OnClose::new(|session: &String| {
                    black_box(session.len());
                })),
        )
        .unwrap();

    c.bench_function("scope_create_resolve_close", |b| {
        b.iter(|| {
            let scope = registry.create_scope(Some("request"), None).unwrap();
            black_box(scope.resolve("session").unwrap());
            scope.close();
        })
    });
}

fn bench_dependency_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependency_chain");

    for depth in [1usize, 4, 16] {
        let registry = ServiceRegistry::new();
        registry.register(ServiceDescriptor::transient("link0", |_| Ok(0usize))).unwrap();
        for i in 1..depth {
            let previous = format!("link{}", i - 1);
            registry
                .register(
                    ServiceDescriptor::transient(format!("link{}", i), move |ctx| {
                        let below: Arc<usize> = ctx.require(&previous)?;
                        Ok(*below + 1)
                    }),
                )
                .unwrap();
        }
        let top = format!("link{}", depth - 1);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &top, |b, top| {
            b.iter(|| {
                let v = registry.require::<usize>(top).unwrap();
                black_box(*v);
            })
        });
    }

    group.finish();
}

fn bench_retry_with_fallback(c: &mut Criterion) {
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .max_attempts(3)
        .fallback(|_, _| Ok(0u32))
        .build()
        .unwrap();
    registry
        .register(
            ServiceDescriptor::transient::<u32, _>("unstable", |_| {
                Err(ServiceFailure::new(FailureKind::Unavailable, "down"))
            })
            .resilience(policy),
        )
        .unwrap();

    c.bench_function("transient_retry_then_fallback", |b| {
        b.iter(|| {
            let v = registry.require::<u32>("unstable").unwrap();
            black_box(*v);
        })
    });
}

fn bench_health_snapshot(c: &mut Criterion) {
    let registry = ServiceRegistry::new();
    for i in 0..32u32 {
        registry
            .register(
                ServiceDescriptor::instance(format!("svc{}", i), i)
                    .health_check(|value: &u32, _| Ok::<_, ServiceFailure>(*value % 7 != 0)),
            )
            .unwrap();
    }

    c.bench_function("health_snapshot_32", |b| {
        b.iter(|| black_box(registry.health_snapshot().len()))
    });
}

criterion_group!(
    benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_scoped_vs_transient,
    bench_scope_lifecycle,
    bench_dependency_chain,
    bench_retry_with_fallback,
    bench_health_snapshot
);
criterion_main!(benches);
