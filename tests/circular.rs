use ferrous_registry::{
    DiError, ResiliencePolicy, Resolver, ServiceDescriptor, ServiceRegistry, MAX_RESOLUTION_DEPTH,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn test_declared_cycle_is_detected() {
    let registry = ServiceRegistry::new();
    registry
        .register(ServiceDescriptor::singleton("a", |_| Ok(1u8)).with_dependencies(["b"]))
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("b", |_| Ok(2u8)).with_dependencies(["a"]))
        .unwrap();

    match registry.resolve("a") {
        Err(DiError::Circular(path)) => assert_eq!(path, vec!["a", "b", "a"]),
        other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
    }

    let message = registry.resolve("b").unwrap_err().to_string();
    assert!(message.contains('a'));
    assert!(message.contains('b'));
    assert!(message.contains("b -> a -> b"));
}

#[test]
fn test_cycle_through_factory_calls() {
    let registry = ServiceRegistry::new();
    registry
        .register(ServiceDescriptor::transient("ping", |ctx| {
            let pong: Arc<u8> = ctx.require("pong")?;
            Ok(*pong)
        }))
        .unwrap();
    registry
        .register(ServiceDescriptor::transient("pong", |ctx| {
            let ping: Arc<u8> = ctx.require("ping")?;
            Ok(*ping)
        }))
        .unwrap();

    assert!(matches!(registry.resolve("ping"), Err(DiError::Circular(ref path)) if path.len() == 3));
}

#[test]
fn test_cycle_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::singleton("a", move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                let b: Arc<u8> = ctx.require("b")?;
                Ok(*b)
            })
            .resilience(ResiliencePolicy::retry(5).unwrap()),
        )
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("b", |_| Ok(1u8)).with_dependencies(["a"]))
        .unwrap();

    assert!(matches!(registry.resolve("a"), Err(DiError::Circular(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.service_metrics()["a"].retries, 0);
}

#[test]
fn test_aliases_participate_in_cycles() {
    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::singleton("alpha", |_| Ok(1u8))
                .with_aliases(["first"])
                .with_dependencies(["beta"]),
        )
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("beta", |_| Ok(2u8)).with_dependencies(["first"]))
        .unwrap();

    match registry.resolve("first") {
        Err(DiError::Circular(path)) => assert_eq!(path, vec!["alpha", "beta", "alpha"]),
        other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let registry = ServiceRegistry::new();
    registry.register(ServiceDescriptor::singleton("d", |_| Ok(4u8))).unwrap();
    registry
        .register(ServiceDescriptor::singleton("b", |_| Ok(2u8)).with_dependencies(["d"]))
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("c", |_| Ok(3u8)).with_dependencies(["d"]))
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("a", |_| Ok(1u8)).with_dependencies(["b", "c"]))
        .unwrap();

    assert_eq!(*registry.require::<u8>("a").unwrap(), 1);
    assert!(registry.service_topology().is_acyclic());
}

/// Registers `s0 -> s1 -> ... -> s{len-1}` as declared dependencies.
fn declared_chain(registry: &ServiceRegistry, len: usize) {
    for i in 0..len {
        let mut descriptor = ServiceDescriptor::transient(format!("s{}", i), |_| Ok(()));
        if i + 1 < len {
            descriptor = descriptor.with_dependencies([format!("s{}", i + 1)]);
        }
        registry.register(descriptor).unwrap();
    }
}

#[test]
fn test_chain_up_to_depth_limit_resolves() {
    for len in [MAX_RESOLUTION_DEPTH - 1, MAX_RESOLUTION_DEPTH] {
        let registry = ServiceRegistry::new();
        declared_chain(&registry, len);
        assert!(registry.resolve("s0").is_ok(), "chain of {} should resolve", len);
    }
}

#[test]
fn test_chain_past_depth_limit_fails_cleanly() {
    let registry = ServiceRegistry::new();
    declared_chain(&registry, MAX_RESOLUTION_DEPTH + 1);

    match registry.resolve("s0") {
        Err(DiError::DepthExceeded(depth)) => assert_eq!(depth, MAX_RESOLUTION_DEPTH),
        other => panic!("expected depth error, got {:?}", other.map(|_| ())),
    }
    // the tail of the chain is still reachable on its own
    assert!(registry.resolve("s1").is_ok());
}

#[test]
fn test_depth_limit_applies_to_factory_resolution() {
    let registry = ServiceRegistry::new();
    let len = MAX_RESOLUTION_DEPTH + 1;
    for i in 0..len {
        let next = format!("s{}", i + 1);
        registry
            .register(ServiceDescriptor::transient(format!("s{}", i), move |ctx| {
                if i + 1 < len {
                    ctx.resolve(&next)?;
                }
                Ok(())
            }))
            .unwrap();
    }

    assert!(matches!(registry.resolve("s0"), Err(DiError::DepthExceeded(_))));
    assert!(registry.resolve("s1").is_ok());
}
