use ferrous_registry::{
    DiError, FailureKind, InsightsObserver, LoggingObserver, RegistryConfig, ResiliencePolicy, ResolutionObserver,
    Resolver, ServiceDescriptor, ServiceFailure, ServiceRegistry, ServiceResolutionEvent,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ServiceResolutionEvent>>,
}

impl ResolutionObserver for Recorder {
    fn on_resolution(&self, event: &ServiceResolutionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn test_observer_sees_every_attempt() {
    let registry = ServiceRegistry::new();
    let recorder = Arc::new(Recorder::default());
    registry.add_resolution_observer(recorder.clone()).unwrap();
    assert_eq!(registry.resolution_observer_count(), 1);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    registry
        .register(
            ServiceDescriptor::singleton("svc", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceFailure::new(FailureKind::Unavailable, "not yet"))
                } else {
                    Ok(1u8)
                }
            })
            .resilience(ResiliencePolicy::retry(3).unwrap()),
        )
        .unwrap();

    registry.resolve("svc").unwrap();
    registry.resolve("svc").unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.len(), 4);
    assert_eq!(
        events.iter().map(|event| event.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3, 1]
    );
    assert!(events[0].retry_scheduled && events[1].retry_scheduled);
    assert!(events[2].success && events[2].recovered);
    assert!(events[3].from_cache);
    assert_eq!(events, registry.resolution_history());
}

#[test]
fn test_observer_registration_rules() {
    let registry = ServiceRegistry::new();
    let observer: Arc<dyn ResolutionObserver> = Arc::new(|_: &ServiceResolutionEvent| {});

    registry.add_resolution_observer(observer.clone()).unwrap();
    assert!(matches!(
        registry.add_resolution_observer(observer.clone()),
        Err(DiError::ObserverAlreadyRegistered)
    ));
    registry.remove_resolution_observer(&observer).unwrap();
    assert!(matches!(
        registry.remove_resolution_observer(&observer),
        Err(DiError::ObserverNotRegistered)
    ));
    assert_eq!(registry.resolution_observer_count(), 0);
}

#[test]
fn test_panicking_observer_is_isolated() {
    let registry = ServiceRegistry::new();
    let recorder = Arc::new(Recorder::default());
    registry
        .add_resolution_observer(Arc::new(|_: &ServiceResolutionEvent| panic!("observer bug")))
        .unwrap();
    registry.add_resolution_observer(recorder.clone()).unwrap();
    registry.add_resolution_observer(Arc::new(LoggingObserver::new())).unwrap();
    registry.register(ServiceDescriptor::transient("svc", |_| Ok(1u8))).unwrap();

    assert!(registry.resolve("svc").is_ok());
    assert_eq!(recorder.events.lock().unwrap().len(), 1);
}

#[test]
fn test_observer_may_call_back_into_registry() {
    let registry = ServiceRegistry::new();
    let seen = Arc::new(AtomicU32::new(0));
    let counter = seen.clone();
    let inner = registry.clone();
    registry
        .add_resolution_observer(Arc::new(move |event: &ServiceResolutionEvent| {
            let metrics = inner.service_metrics();
            if metrics.contains_key(&event.name) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();
    registry.register(ServiceDescriptor::singleton("svc", |_| Ok(1u8))).unwrap();
    registry.resolve("svc").unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    registry.shutdown();
}

#[test]
fn test_failure_events_carry_errors() {
    let registry = ServiceRegistry::new();
    registry
        .register(ServiceDescriptor::singleton::<u8, _>("broken", |_| Err(ServiceFailure::other("boom"))))
        .unwrap();
    assert!(registry.resolve("broken").is_err());

    let event = &registry.resolution_history()[0];
    assert!(!event.success);
    assert!(!event.retry_scheduled);
    assert_eq!(event.error.as_deref(), Some("Service 'broken' failed: Other: boom"));
    assert_eq!(event.max_attempts, 1);
}

#[test]
fn test_insights_aggregate_failures_recoveries_and_slow_services() {
    let registry = ServiceRegistry::with_config(RegistryConfig {
        slow_resolution_threshold_ms: 5,
        ..Default::default()
    })
    .unwrap();
    let insights = registry.attach_insights().unwrap();
    assert_eq!(insights.slow_threshold(), Duration::from_millis(5));

    registry
        .register(ServiceDescriptor::singleton("slow", |_| {
            thread::sleep(Duration::from_millis(10));
            Ok(1u8)
        }))
        .unwrap();
    registry
        .register(ServiceDescriptor::singleton::<u8, _>("broken", |_| Err(ServiceFailure::other("boom"))))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    registry
        .register(
            ServiceDescriptor::singleton("flaky", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ServiceFailure::other("cold start"))
                } else {
                    Ok(1u8)
                }
            })
            .resilience(ResiliencePolicy::retry(2).unwrap()),
        )
        .unwrap();

    registry.resolve("slow").unwrap();
    registry.resolve("slow").unwrap();
    let _ = registry.resolve("broken");
    let _ = registry.resolve("broken");
    registry.resolve("flaky").unwrap();

    let report = insights.insights();
    assert!(report.slow_services["slow"] >= Duration::from_millis(10));
    assert_eq!(report.failure_counts["broken"], 2);
    assert!(!report.failure_counts.contains_key("flaky"));
    assert_eq!(report.recovery_counts["flaky"], 1);
    assert!(report.last_failure_messages["broken"].is_some());

    insights.clear();
    assert!(insights.insights().failure_counts.is_empty());

    let standalone = InsightsObserver::default();
    assert_eq!(standalone.slow_threshold(), Duration::from_millis(250));
}
