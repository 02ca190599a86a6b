//! The resolution engine.
//!
//! One call of [`ServiceRegistry::resolve_with`] looks the service up, serves
//! it from the singleton or scope cache when possible, and otherwise runs the
//! attempt loop: dependencies, factory, retry with backoff, fallback. The
//! created value is then checked against the contract and validator and
//! stored according to its lifetime. Each attempt emits exactly one
//! [`ServiceResolutionEvent`].
//!
//! Caches are committed first-writer-wins. Two threads resolving the same
//! uncached service at once may both run the factory; the instance stored
//! first is the one every caller receives.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::descriptors::{ServiceDescriptor, ValidatorFn};
use crate::error::{DiError, DiResult, ServiceFailure};
use crate::internal::circular::is_terminal;
use crate::internal::guard;
use crate::internal::{extend_chain, terminal_cause, ShutdownHook};
use crate::lifetime::Lifetime;
use crate::metrics::ServiceRuntimeMetrics;
use crate::observer::ServiceResolutionEvent;
use crate::registration::{AnyArc, RegistryState};
use crate::resilience::ResiliencePolicy;

use super::scope::{ScopeInner, Stored};
use super::{ResolverContext, ServiceRegistry};

/// Why one attempt produced no instance.
enum AttemptError {
    /// Subject to the resilience policy
    Failure(ServiceFailure),
    /// Surfaces unchanged (cycles, shutdown, closed scopes)
    Terminal(DiError),
}

/// Fields shared by every event of one resolution.
struct Trace<'a> {
    name: &'a str,
    lifetime: Lifetime,
    scope: &'a str,
    chain: &'a [String],
    max_attempts: u32,
}

impl Trace<'_> {
    fn event(&self, attempt: u32) -> ServiceResolutionEvent {
        ServiceResolutionEvent {
            name: self.name.to_string(),
            lifetime: self.lifetime,
            scope: self.scope.to_string(),
            success: false,
            duration: None,
            error: None,
            timestamp: SystemTime::now(),
            from_cache: false,
            dependency_chain: self.chain.to_vec(),
            attempt,
            max_attempts: self.max_attempts,
            recovered: false,
            retry_scheduled: false,
        }
    }
}

impl ServiceRegistry {
    /// Resolves `name` in `scope` with `chain` naming the resolutions already
    /// in progress on this call stack.
    pub(crate) fn resolve_with(&self, name: &str, scope: &Arc<ScopeInner>, chain: &[String]) -> DiResult<AnyArc> {
        let (descriptor, cached) = {
            let state = self.inner.state.lock();
            state.ensure_active()?;
            let descriptor = state.lookup(name)?.clone();
            let cached = match descriptor.lifetime {
                Lifetime::Singleton => state.singletons.get(&descriptor.name).cloned(),
                _ => None,
            };
            (descriptor, cached)
        };

        let chain = extend_chain(chain, &descriptor.name)?;
        let trace = Trace {
            name: &descriptor.name,
            lifetime: descriptor.lifetime,
            scope: scope.name(),
            chain: &chain,
            max_attempts: descriptor.max_attempts(),
        };

        let cached = match descriptor.lifetime {
            Lifetime::Scoped => {
                scope.ensure_open()?;
                scope.cached(&descriptor.name)
            }
            _ => cached,
        };
        if let Some(instance) = cached {
            tracing::trace!(service = %descriptor.name, scope = %scope.name(), "served from cache");
            self.emit(ServiceResolutionEvent {
                success: true,
                duration: Some(Duration::ZERO),
                from_cache: true,
                ..trace.event(1)
            });
            return Ok(instance);
        }

        self.create(&descriptor, scope, &trace, name)
    }

    fn create(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        scope: &Arc<ScopeInner>,
        trace: &Trace<'_>,
        requested: &str,
    ) -> DiResult<AnyArc> {
        let service = trace.name;
        let policy = descriptor.resilience.as_ref();
        let mut attempt = 0;
        let mut used_fallback = false;
        let mut started;

        let instance = loop {
            attempt += 1;
            started = Instant::now();
            let failure = match self.attempt(descriptor, scope, trace.chain) {
                Ok(instance) => break instance,
                Err(AttemptError::Terminal(error)) => {
                    return Err(self.fail(trace, attempt, started.elapsed(), error));
                }
                Err(AttemptError::Failure(failure)) => failure,
            };
            let elapsed = started.elapsed();

            if let Some(policy) = policy.filter(|policy| policy.should_retry(&failure, attempt)) {
                let delay = policy.compute_delay(attempt);
                self.update_metrics(service, |metrics| metrics.record_retry(&failure, attempt, elapsed));
                tracing::warn!(
                    service = %service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "service creation failed, retrying"
                );
                self.emit(ServiceResolutionEvent {
                    duration: Some(elapsed),
                    error: Some(failure.to_string()),
                    retry_scheduled: true,
                    ..trace.event(attempt)
                });
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                continue;
            }

            let Some(fallback) = policy.and_then(ResiliencePolicy::fallback) else {
                let error = DiError::Factory {
                    service: service.to_string(),
                    failure,
                };
                return Err(self.fail(trace, attempt, elapsed, error));
            };
            let ctx = ResolverContext::new(self, scope, trace.chain);
            let outcome = guard::catch(|| fallback(&ctx, &failure)).unwrap_or_else(|panic| {
                Err(ServiceFailure::panic(format!("fallback for '{}' panicked: {}", service, panic)))
            });
            match outcome {
                Ok(instance) => {
                    tracing::debug!(service = %service, error = %failure, "fallback used");
                    used_fallback = true;
                    break instance;
                }
                Err(failure) => {
                    let error = DiError::Fallback {
                        service: service.to_string(),
                        failure,
                    };
                    return Err(self.fail(trace, attempt, started.elapsed(), error));
                }
            }
        };

        let recovered = used_fallback || attempt > 1;
        if used_fallback {
            self.update_metrics(service, ServiceRuntimeMetrics::record_fallback);
        }

        if let Some(contract) = &descriptor.contract {
            if !contract.accepts(&instance) {
                let error = DiError::ContractViolation {
                    service: service.to_string(),
                    expected: contract.describe(),
                    actual: descriptor.describe_value(&instance).to_string(),
                };
                let message = error.to_string();
                self.update_metrics(service, |metrics| metrics.record_contract_violation(message, attempt));
                self.emit_failure(trace, attempt, started.elapsed(), &error);
                return Err(error);
            }
        }
        if let Some(validator) = &descriptor.validator {
            if let Err(error) = self.run_validator(descriptor, validator, &instance) {
                return Err(self.fail(trace, attempt, started.elapsed(), error));
            }
        }

        let duration = started.elapsed();
        self.update_metrics(service, |metrics| metrics.record_success(duration, attempt, recovered));
        let success = |from_cache: bool| ServiceResolutionEvent {
            success: true,
            duration: Some(duration),
            from_cache,
            recovered,
            ..trace.event(attempt)
        };

        match descriptor.lifetime {
            Lifetime::Transient => {
                self.emit(success(false));
                Ok(instance)
            }
            Lifetime::Singleton => {
                let mut state = self.inner.state.lock();
                if state.shut_down {
                    drop(state);
                    dispose_unstored(descriptor, instance);
                    return Err(self.fail(trace, attempt, duration, DiError::RegistryShutdown));
                }
                if !is_current(&state, descriptor) {
                    drop(state);
                    return self.resolve_replaced(descriptor, instance, trace, scope, requested);
                }
                if let Some(existing) = state.singletons.get(service).cloned() {
                    drop(state);
                    self.emit(success(true));
                    return Ok(existing);
                }
                state.singletons.insert(service.to_string(), instance.clone());
                if let Some(callback) = &descriptor.on_close {
                    state
                        .singleton_hooks
                        .insert(service.to_string(), ShutdownHook::new(callback.clone(), instance.clone()));
                }
                drop(state);
                self.emit(success(false));
                Ok(instance)
            }
            Lifetime::Scoped => {
                // Stored under the registry lock so a concurrent replace either
                // purges this instance or is seen here. `_offered` keeps a losing
                // instance from being dropped while the locks are held.
                let _offered = instance.clone();
                let stored = {
                    let state = self.inner.state.lock();
                    if is_current(&state, descriptor) {
                        Ok(scope.store(service, instance, descriptor.on_close.as_ref()))
                    } else {
                        Err(instance)
                    }
                };
                match stored {
                    Ok(Stored::Fresh(instance)) => {
                        self.emit(success(false));
                        Ok(instance)
                    }
                    Ok(Stored::Existing(existing)) => {
                        self.emit(success(true));
                        Ok(existing)
                    }
                    Ok(Stored::Closed(instance)) => {
                        dispose_unstored(descriptor, instance);
                        let error = DiError::ScopeClosed(scope.name().to_string());
                        Err(self.fail(trace, attempt, duration, error))
                    }
                    Err(instance) => self.resolve_replaced(descriptor, instance, trace, scope, requested),
                }
            }
        }
    }

    /// Disposes an instance whose descriptor was replaced or removed while it
    /// was being created, then resolves `requested` again.
    fn resolve_replaced(
        &self,
        descriptor: &ServiceDescriptor,
        instance: AnyArc,
        trace: &Trace<'_>,
        scope: &Arc<ScopeInner>,
        requested: &str,
    ) -> DiResult<AnyArc> {
        tracing::debug!(service = %trace.name, "service replaced during creation, resolving again");
        dispose_unstored(descriptor, instance);
        let outer = &trace.chain[..trace.chain.len() - 1];
        self.resolve_with(requested, scope, outer)
    }

    /// Resolves dependencies, then runs the factory once.
    fn attempt(
        &self,
        descriptor: &ServiceDescriptor,
        scope: &Arc<ScopeInner>,
        chain: &[String],
    ) -> Result<AnyArc, AttemptError> {
        for dependency in &descriptor.dependencies {
            if let Err(error) = self.resolve_with(dependency, scope, chain) {
                return Err(if is_terminal(&error) {
                    AttemptError::Terminal(error)
                } else {
                    AttemptError::Failure(ServiceFailure::dependency(dependency, &descriptor.name, error))
                });
            }
        }

        let ctx = ResolverContext::new(self, scope, chain);
        match guard::catch(|| (descriptor.factory)(&ctx)) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(failure)) => Err(match terminal_cause(&failure) {
                Some(error) => AttemptError::Terminal(error),
                None => AttemptError::Failure(failure),
            }),
            Err(panic) => Err(AttemptError::Failure(ServiceFailure::panic(format!(
                "factory for '{}' panicked: {}",
                descriptor.name, panic
            )))),
        }
    }

    pub(crate) fn run_validator(
        &self,
        descriptor: &ServiceDescriptor,
        validator: &ValidatorFn,
        instance: &AnyArc,
    ) -> DiResult<()> {
        let outcome = guard::catch(|| validator(instance, self)).unwrap_or_else(|panic| {
            Err(ServiceFailure::panic(format!(
                "validator for '{}' panicked: {}",
                descriptor.name, panic
            )))
        });
        outcome.map_err(|failure| DiError::Validation {
            service: descriptor.name.clone(),
            failure,
        })
    }

    /// Records a terminal failure and emits its event.
    fn fail(&self, trace: &Trace<'_>, attempt: u32, elapsed: Duration, error: DiError) -> DiError {
        let message = error.to_string();
        self.update_metrics(trace.name, |metrics| metrics.record_failure(message, attempt));
        self.emit_failure(trace, attempt, elapsed, &error);
        error
    }

    fn emit_failure(&self, trace: &Trace<'_>, attempt: u32, elapsed: Duration, error: &DiError) {
        self.emit(ServiceResolutionEvent {
            duration: Some(elapsed),
            error: Some(error.to_string()),
            ..trace.event(attempt)
        });
    }

    fn update_metrics<F>(&self, service: &str, update: F)
    where
        F: FnOnce(&mut ServiceRuntimeMetrics),
    {
        if let Some(metrics) = self.inner.state.lock().metrics.get_mut(service) {
            update(metrics);
        }
    }

    /// Appends to the history and notifies observers outside the lock.
    fn emit(&self, event: ServiceResolutionEvent) {
        let observers = {
            let mut state = self.inner.state.lock();
            state.history.push(event.clone());
            state.observers.snapshot()
        };
        for observer in observers {
            if let Err(panic) = guard::catch(|| observer.on_resolution(&event)) {
                tracing::error!(service = %event.name, panic = %panic, "resolution observer panicked");
            }
        }
    }
}

fn is_current(state: &RegistryState, descriptor: &Arc<ServiceDescriptor>) -> bool {
    state
        .descriptors
        .get(&descriptor.name)
        .is_some_and(|registered| Arc::ptr_eq(registered, descriptor))
}

/// Releases an instance that never reached a cache.
fn dispose_unstored(descriptor: &ServiceDescriptor, instance: AnyArc) {
    if let Some(callback) = &descriptor.on_close {
        ShutdownHook::new(callback.clone(), instance).invoke(&descriptor.name);
    }
}
