use ferrous_registry::{
    Contract, DiError, FailureKind, ResiliencePolicy, Resolver, ServiceDescriptor, ServiceFailure,
    ServiceRegistry,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fails_times(times: u32, kind: FailureKind) -> (Arc<AtomicU32>, ServiceDescriptor) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let descriptor = ServiceDescriptor::singleton("flaky", move |_| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        if call < times {
            Err(ServiceFailure::new(kind.clone(), format!("attempt {} failed", call + 1)))
        } else {
            Ok(String::from("ready"))
        }
    });
    (calls, descriptor)
}

#[test]
fn test_retry_then_success() {
    let (calls, descriptor) = fails_times(1, FailureKind::Unavailable);
    let registry = ServiceRegistry::new();
    registry
        .register(descriptor.resilience(ResiliencePolicy::retry(2).unwrap()))
        .unwrap();

    assert_eq!(*registry.require::<String>("flaky").unwrap(), "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let metrics = &registry.service_metrics()["flaky"];
    assert_eq!(metrics.retries, 1);
    assert_eq!(metrics.created, 1);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.last_attempts, 2);
    assert!(metrics.last_recovered);

    let history = registry.resolution_history();
    assert_eq!(history.len(), 2);
    assert!(!history[0].success);
    assert!(history[0].retry_scheduled);
    assert_eq!(history[0].attempt, 1);
    assert_eq!(history[0].max_attempts, 2);
    assert!(history[1].success);
    assert!(history[1].recovered);
    assert_eq!(history[1].attempt, 2);
}

#[test]
fn test_exhausted_retries_surface_original_failure() {
    let (calls, descriptor) = fails_times(10, FailureKind::Timeout);
    let registry = ServiceRegistry::new();
    registry
        .register(descriptor.resilience(ResiliencePolicy::retry(3).unwrap()))
        .unwrap();

    match registry.resolve("flaky") {
        Err(DiError::Factory { service, failure }) => {
            assert_eq!(service, "flaky");
            assert_eq!(failure.kind(), &FailureKind::Timeout);
            assert_eq!(failure.message(), "attempt 3 failed");
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let metrics = &registry.service_metrics()["flaky"];
    assert_eq!(metrics.retries, 2);
    assert_eq!(metrics.failures, 1);
    assert!(metrics.last_error.as_deref().unwrap_or_default().contains("attempt 3 failed"));

    let history = registry.resolution_history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|event| event.retry_scheduled).count(), 2);
    assert!(!history[2].retry_scheduled);
    assert!(history[2].error.is_some());
}

#[test]
fn test_retry_only_matching_kinds() {
    let (calls, descriptor) = fails_times(1, FailureKind::Configuration);
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .max_attempts(3)
        .retry_on([FailureKind::Timeout, FailureKind::Unavailable])
        .build()
        .unwrap();
    registry.register(descriptor.resilience(policy)).unwrap();

    assert!(matches!(registry.resolve("flaky"), Err(DiError::Factory { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backoff_delays_between_attempts() {
    let (_, descriptor) = fails_times(2, FailureKind::Io);
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(10))
        .backoff_factor(2.0)
        .build()
        .unwrap();
    registry.register(descriptor.resilience(policy)).unwrap();

    let started = std::time::Instant::now();
    registry.resolve("flaky").unwrap();
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_fallback_value_is_used() {
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .fallback(|_, _| {
            let mut value = HashMap::new();
            value.insert("value".to_string(), "fallback".to_string());
            Ok(value)
        })
        .build()
        .unwrap();
    registry
        .register(
            ServiceDescriptor::singleton::<HashMap<String, String>, _>("settings", |_| {
                Err(ServiceFailure::new(FailureKind::Unavailable, "remote config down"))
            })
            .resilience(policy),
        )
        .unwrap();

    let settings = registry.require::<HashMap<String, String>>("settings").unwrap();
    assert_eq!(settings["value"], "fallback");

    let metrics = &registry.service_metrics()["settings"];
    assert_eq!(metrics.fallback_uses, 1);
    assert!(metrics.last_recovered);
    let last = registry.resolution_history().pop().unwrap();
    assert!(last.success && last.recovered);
}

#[test]
fn test_fallback_receives_last_failure() {
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .max_attempts(2)
        .fallback(|ctx, failure| Ok(format!("{} recovered from {}", ctx.service_name(), failure.message())))
        .build()
        .unwrap();
    let (_, descriptor) = fails_times(5, FailureKind::Timeout);
    registry.register(descriptor.resilience(policy)).unwrap();

    assert_eq!(
        *registry.require::<String>("flaky").unwrap(),
        "flaky recovered from attempt 2 failed"
    );
}

#[test]
fn test_failing_fallback_surfaces_its_own_error() {
    let registry = ServiceRegistry::new();
    let policy = ResiliencePolicy::builder()
        .fallback::<String, _>(|_, _| Err(ServiceFailure::other("fallback exploded")))
        .build()
        .unwrap();
    let (_, descriptor) = fails_times(5, FailureKind::Timeout);
    registry.register(descriptor.resilience(policy)).unwrap();

    match registry.resolve("flaky") {
        Err(DiError::Fallback { failure, .. }) => assert_eq!(failure.message(), "fallback exploded"),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert_eq!(registry.service_metrics()["flaky"].failures, 1);
}

#[test]
fn test_panicking_factory_is_a_retryable_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::singleton("fragile", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first call explodes");
                }
                Ok(7u8)
            })
            .resilience(ResiliencePolicy::retry(2).unwrap()),
        )
        .unwrap();

    assert_eq!(*registry.require::<u8>("fragile").unwrap(), 7);
    let first = &registry.resolution_history()[0];
    assert!(first.error.as_deref().unwrap_or_default().contains("first call explodes"));
}

#[test]
fn test_contract_violation_is_terminal() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::singleton("port", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(8080u16)
            })
            .contract(Contract::of::<u32>().or::<u64>())
            .resilience(ResiliencePolicy::retry(3).unwrap()),
        )
        .unwrap();

    match registry.resolve("port") {
        Err(DiError::ContractViolation { service, expected, actual }) => {
            assert_eq!(service, "port");
            assert_eq!(expected, "u32 | u64");
            assert_eq!(actual, "u16");
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let metrics = &registry.service_metrics()["port"];
    assert_eq!(metrics.contract_violations, 1);
    assert_eq!(metrics.created, 0);
    assert_eq!(metrics.failures, 1);
}

#[test]
fn test_validator_failure_is_terminal() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let registry = ServiceRegistry::new();
    registry
        .register(
            ServiceDescriptor::singleton("pool_size", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0usize)
            })
            .validator(|size: &usize, _| {
                if *size == 0 {
                    Err(ServiceFailure::new(FailureKind::Configuration, "pool size must be positive"))
                } else {
                    Ok(())
                }
            })
            .resilience(ResiliencePolicy::retry(3).unwrap()),
        )
        .unwrap();

    assert!(matches!(registry.resolve("pool_size"), Err(DiError::Validation { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(registry.resolve("pool_size").is_err());
    assert_eq!(registry.service_metrics()["pool_size"].failures, 2);
}

#[test]
fn test_dependency_failure_is_wrapped_and_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let registry = ServiceRegistry::new();
    registry
        .register(ServiceDescriptor::transient("db", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceFailure::new(FailureKind::Unavailable, "db offline"))
            } else {
                Ok(1u8)
            }
        }))
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton("repo", |_| Ok(2u8)).with_dependencies(["db"]))
        .unwrap();
    registry
        .register(
            ServiceDescriptor::singleton("api", |_| Ok(3u8))
                .with_dependencies(["db"])
                .resilience(ResiliencePolicy::retry(2).unwrap()),
        )
        .unwrap();

    let error = registry.resolve("repo").unwrap_err();
    let failure = error.failure().unwrap();
    assert_eq!(failure.kind(), &FailureKind::Dependency);
    assert!(failure.message().starts_with("Dependency 'db' failed while resolving 'repo'"));

    // db now succeeds, so api needs no retry
    assert!(registry.resolve("api").is_ok());
    assert_eq!(registry.service_metrics()["api"].retries, 0);
}

#[test]
fn test_default_policy_applies_to_later_registrations() {
    let registry = ServiceRegistry::new();
    registry.set_default_resilience_policy(Some(ResiliencePolicy::retry(2).unwrap()));
    let (_, descriptor) = fails_times(1, FailureKind::Other);
    registry.register(descriptor).unwrap();
    registry
        .register(
            ServiceDescriptor::singleton("explicit", |_| Ok(1u8)).resilience(ResiliencePolicy::retry(4).unwrap()),
        )
        .unwrap();

    assert!(registry.resolve("flaky").is_ok());
    let policies = registry.service_resilience_policies();
    assert_eq!(policies["flaky"].as_ref().map(|p| p.max_attempts), Some(2));
    assert_eq!(policies["explicit"].as_ref().map(|p| p.max_attempts), Some(4));

    registry.set_default_resilience_policy(None);
    assert!(registry.default_resilience_policy().is_none());
}

#[test]
fn test_invalid_policies_are_rejected() {
    assert!(matches!(ResiliencePolicy::retry(0), Err(DiError::InvalidPolicy(_))));
    assert!(matches!(
        ResiliencePolicy::builder().backoff_factor(-1.0).build(),
        Err(DiError::InvalidPolicy(_))
    ));
    assert!(matches!(
        ResiliencePolicy::builder().backoff_factor(f64::INFINITY).build(),
        Err(DiError::InvalidPolicy(_))
    ));
}

mod backoff {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn delay_grows_geometrically(initial_ms in 1u64..500, factor in 1.0f64..4.0, attempt in 1u32..8) {
            let policy = ResiliencePolicy::builder()
                .max_attempts(10)
                .initial_delay(Duration::from_millis(initial_ms))
                .backoff_factor(factor)
                .build()
                .unwrap();
            let expected = initial_ms as f64 / 1000.0 * factor.powi(attempt as i32 - 1);
            let actual = policy.compute_delay(attempt).as_secs_f64();
            prop_assert!((actual - expected).abs() < 1e-6);
            prop_assert!(policy.compute_delay(attempt + 1) >= policy.compute_delay(attempt));
        }

        #[test]
        fn zero_initial_delay_never_waits(factor in 0.0f64..10.0, attempt in 1u32..20) {
            let policy = ResiliencePolicy::builder().backoff_factor(factor).build().unwrap();
            prop_assert_eq!(policy.compute_delay(attempt), Duration::ZERO);
        }

        #[test]
        fn retries_stop_at_max_attempts(max in 1u32..10, attempt in 1u32..12) {
            let policy = ResiliencePolicy::retry(max).unwrap();
            let failure = ServiceFailure::other("boom");
            prop_assert_eq!(policy.should_retry(&failure, attempt), attempt < max);
        }
    }
}
