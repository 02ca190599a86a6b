//! Resolution events and the observers that consume them.
//!
//! Every resolution attempt produces exactly one [`ServiceResolutionEvent`]:
//! cache hits, failed attempts that will be retried, terminal failures and
//! successes. Events are appended to a bounded history ring and delivered to
//! every registered [`ResolutionObserver`] on the resolving thread, after the
//! registry lock has been released.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::lifetime::Lifetime;

/// Record of one resolution attempt.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceResolutionEvent {
    /// Canonical service name
    pub name: String,
    pub lifetime: Lifetime,
    /// Name of the scope the resolution ran in
    pub scope: String,
    pub success: bool,
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
    pub from_cache: bool,
    /// Services being resolved on this call stack, ending with `name`
    pub dependency_chain: Vec<String>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    /// Succeeded after a retry or through the fallback
    pub recovered: bool,
    /// This failed attempt will be retried
    pub retry_scheduled: bool,
}

/// Receives one call per resolution attempt.
///
/// Implementations run synchronously on the resolving thread and must not
/// block for long. A panicking observer is logged and skipped.
///
/// Any `Fn(&ServiceResolutionEvent) + Send + Sync` closure is an observer:
///
/// ```rust
/// use ferrous_registry::{ResolutionObserver, ServiceDescriptor, ServiceRegistry, ServiceResolutionEvent, Resolver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let registry = ServiceRegistry::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let observer: Arc<dyn ResolutionObserver> = Arc::new(move |_: &ServiceResolutionEvent| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// registry.add_resolution_observer(observer.clone()).unwrap();
///
/// registry.register(ServiceDescriptor::singleton("answer", |_| Ok(42u32))).unwrap();
/// registry.resolve("answer").unwrap();
/// registry.resolve("answer").unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 2);
///
/// registry.remove_resolution_observer(&observer).unwrap();
/// ```
pub trait ResolutionObserver: Send + Sync {
    fn on_resolution(&self, event: &ServiceResolutionEvent);
}

impl<F> ResolutionObserver for F
where
    F: Fn(&ServiceResolutionEvent) + Send + Sync,
{
    fn on_resolution(&self, event: &ServiceResolutionEvent) {
        self(event)
    }
}

/// Registered observers, compared by allocation identity.
#[derive(Default)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ResolutionObserver>>,
}

impl Observers {
    fn position(&self, observer: &Arc<dyn ResolutionObserver>) -> Option<usize> {
        let target = Arc::as_ptr(observer) as *const ();
        self.observers
            .iter()
            .position(|existing| Arc::as_ptr(existing) as *const () == target)
    }

    /// Returns false if the observer is already registered.
    pub(crate) fn add(&mut self, observer: Arc<dyn ResolutionObserver>) -> bool {
        if self.position(&observer).is_some() {
            return false;
        }
        self.observers.push(observer);
        true
    }

    pub(crate) fn remove(&mut self, observer: &Arc<dyn ResolutionObserver>) -> bool {
        match self.position(observer) {
            Some(index) => {
                self.observers.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ResolutionObserver>> {
        self.observers.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn clear(&mut self) {
        self.observers.clear();
    }
}

/// Bounded ring of the most recent events.
pub(crate) struct ResolutionHistory {
    events: VecDeque<ServiceResolutionEvent>,
    capacity: usize,
}

impl ResolutionHistory {
    pub(crate) const DEFAULT_CAPACITY: usize = 256;

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, event: ServiceResolutionEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn snapshot(&self) -> Vec<ServiceResolutionEvent> {
        self.events.iter().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

/// Forwards every event to `tracing`.
///
/// Successes log at `debug`, scheduled retries at `info` and failures at
/// `warn`, all under the `ferrous_registry::resolution` target.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "registry".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionObserver for LoggingObserver {
    fn on_resolution(&self, event: &ServiceResolutionEvent) {
        let duration_us = event.duration.map(|d| d.as_micros() as u64);
        if event.success {
            tracing::debug!(
                target: "ferrous_registry::resolution",
                prefix = %self.prefix,
                service = %event.name,
                scope = %event.scope,
                from_cache = event.from_cache,
                recovered = event.recovered,
                attempt = event.attempt,
                duration_us,
                "resolved"
            );
        } else if event.retry_scheduled {
            tracing::info!(
                target: "ferrous_registry::resolution",
                prefix = %self.prefix,
                service = %event.name,
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                error = event.error.as_deref().unwrap_or_default(),
                "attempt failed, retry scheduled"
            );
        } else {
            tracing::warn!(
                target: "ferrous_registry::resolution",
                prefix = %self.prefix,
                service = %event.name,
                scope = %event.scope,
                attempt = event.attempt,
                chain = %event.dependency_chain.join(" -> "),
                error = event.error.as_deref().unwrap_or_default(),
                "resolution failed"
            );
        }
    }
}

/// Aggregate view over the events an [`InsightsObserver`] has seen.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolutionInsights {
    /// Slowest non-cached creation per service, at or above the threshold
    pub slow_services: BTreeMap<String, Duration>,
    /// Terminal failures per service
    pub failure_counts: BTreeMap<String, u64>,
    /// Most recent error per service, cleared by a clean success
    pub last_failure_messages: BTreeMap<String, Option<String>>,
    /// Resolutions that succeeded after a retry or via fallback
    pub recovery_counts: BTreeMap<String, u64>,
}

/// Observer aggregating [`ResolutionInsights`].
///
/// ```rust
/// use ferrous_registry::{InsightsObserver, ResolutionObserver, ServiceRegistry};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let registry = ServiceRegistry::new();
/// let insights = Arc::new(InsightsObserver::new(Duration::from_millis(250)));
/// registry.add_resolution_observer(insights.clone()).unwrap();
/// assert!(insights.insights().failure_counts.is_empty());
/// ```
#[derive(Debug)]
pub struct InsightsObserver {
    slow_threshold: Duration,
    state: Mutex<ResolutionInsights>,
}

impl InsightsObserver {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            state: Mutex::new(ResolutionInsights::default()),
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    pub fn insights(&self) -> ResolutionInsights {
        self.state.lock().clone()
    }

    pub fn clear(&self) {
        *self.state.lock() = ResolutionInsights::default();
    }
}

impl Default for InsightsObserver {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl ResolutionObserver for InsightsObserver {
    fn on_resolution(&self, event: &ServiceResolutionEvent) {
        let mut state = self.state.lock();
        let name = &event.name;
        if !event.success {
            if event.retry_scheduled {
                if let Some(error) = &event.error {
                    state.last_failure_messages.insert(name.clone(), Some(error.clone()));
                }
                return;
            }
            *state.failure_counts.entry(name.clone()).or_default() += 1;
            state.last_failure_messages.insert(name.clone(), event.error.clone());
            return;
        }

        if event.recovered {
            *state.recovery_counts.entry(name.clone()).or_default() += 1;
        }
        if event.recovered || event.error.is_none() {
            state.last_failure_messages.remove(name);
        }
        if let Some(duration) = event.duration {
            if !event.from_cache && duration >= self.slow_threshold {
                let slowest = state.slow_services.entry(name.clone()).or_insert(duration);
                if duration > *slowest {
                    *slowest = duration;
                }
            }
        }
    }
}
