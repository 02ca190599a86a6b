//! Read-only views of the registry and service health checks.
//!
//! Every collection returned here is a snapshot; maps are `BTreeMap`s so the
//! output is stable across calls.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant, SystemTime};

use crate::error::{DiError, DiResult};
use crate::health::{HealthCheckResult, HealthSource, ServiceHealthStatus};
use crate::internal::guard;
use crate::metrics::ServiceRuntimeMetrics;
use crate::observer::ServiceResolutionEvent;
use crate::resilience::PolicySummary;
use crate::topology::ServiceTopology;

use super::{ServiceRegistry, ServiceScope};

impl ServiceRegistry {
    /// Sorted canonical service names.
    pub fn registered_services(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut names: Vec<String> = state.descriptors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is a registered service or alias.
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.state.lock().lookup(name).is_ok()
    }

    /// alias -> canonical name
    pub fn alias_map(&self) -> BTreeMap<String, String> {
        let state = self.inner.state.lock();
        state.aliases.iter().map(|(a, n)| (a.clone(), n.clone())).collect()
    }

    /// tag -> sorted services carrying it
    pub fn tags_index(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.inner.state.lock();
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for descriptor in state.descriptors.values() {
            for tag in &descriptor.tags {
                index.entry(tag.clone()).or_default().insert(descriptor.name.clone());
            }
        }
        index
            .into_iter()
            .map(|(tag, names)| (tag, names.into_iter().collect()))
            .collect()
    }

    pub fn services_with_tag(&self, tag: &str) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut names: Vec<String> = state
            .descriptors
            .values()
            .filter(|descriptor| descriptor.tags.contains(tag))
            .map(|descriptor| descriptor.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Sorted names of open scopes, the root scope included.
    pub fn active_scopes(&self) -> Vec<String> {
        let live = self.inner.state.lock().scopes.live();
        let mut names: BTreeSet<String> = live
            .iter()
            .filter(|scope| !scope.is_closed())
            .map(|scope| scope.name().to_string())
            .collect();
        if !self.inner.root.is_closed() {
            names.insert(self.inner.root.name().to_string());
        }
        names.into_iter().collect()
    }

    /// scope -> sorted names of the instances it holds
    pub fn scope_snapshots(&self) -> BTreeMap<String, Vec<String>> {
        let live = self.inner.state.lock().scopes.live();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(self.inner.root.name().to_string(), self.root_scope().snapshot());
        for scope in live {
            let handle = ServiceScope::new(self.clone(), scope);
            snapshots.insert(handle.name().to_string(), handle.snapshot());
        }
        snapshots
    }

    /// service -> declared dependencies, as registered
    pub fn service_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.inner.state.lock();
        state
            .descriptors
            .values()
            .map(|descriptor| (descriptor.name.clone(), descriptor.dependencies.clone()))
            .collect()
    }

    pub fn service_resilience_policies(&self) -> BTreeMap<String, Option<PolicySummary>> {
        let state = self.inner.state.lock();
        state
            .descriptors
            .values()
            .map(|descriptor| {
                let summary = descriptor.resilience.as_ref().map(|policy| policy.describe());
                (descriptor.name.clone(), summary)
            })
            .collect()
    }

    pub fn service_metrics(&self) -> BTreeMap<String, ServiceRuntimeMetrics> {
        let state = self.inner.state.lock();
        state.metrics.iter().map(|(name, m)| (name.clone(), m.clone())).collect()
    }

    /// Retained events, oldest first.
    pub fn resolution_history(&self) -> Vec<ServiceResolutionEvent> {
        self.inner.state.lock().history.snapshot()
    }

    pub fn clear_resolution_history(&self) {
        self.inner.state.lock().history.clear();
    }

    pub fn resolution_observer_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    pub fn installed_modules(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.modules.iter().map(|module| module.name.clone()).collect()
    }

    pub fn is_module_installed(&self, name: &str) -> bool {
        let name = name.trim();
        self.inner.state.lock().modules.iter().any(|module| module.name == name)
    }

    pub fn module_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.inner.state.lock();
        state
            .modules
            .iter()
            .map(|module| (module.name.clone(), module.dependencies.clone()))
            .collect()
    }

    pub fn module_descriptions(&self) -> BTreeMap<String, Option<String>> {
        let state = self.inner.state.lock();
        state
            .modules
            .iter()
            .map(|module| (module.name.clone(), module.description.clone()))
            .collect()
    }

    /// Dependency graph of the registered services.
    pub fn service_topology(&self) -> ServiceTopology {
        let (dependencies, aliases) = {
            let state = self.inner.state.lock();
            let dependencies: BTreeMap<String, Vec<String>> = state
                .descriptors
                .values()
                .map(|descriptor| (descriptor.name.clone(), descriptor.dependencies.clone()))
                .collect();
            (dependencies, state.aliases.clone())
        };
        ServiceTopology::from_dependencies(&dependencies, &aliases)
    }

    /// Resolves `name` and runs its health check.
    ///
    /// With `tolerate_failures`, a failed resolution or a shut-down registry
    /// yields an unhealthy status instead of an error. Unknown names are
    /// always an error.
    pub fn check_health(
        &self,
        name: &str,
        scope: Option<&ServiceScope>,
        tolerate_failures: bool,
    ) -> DiResult<ServiceHealthStatus> {
        let descriptor = {
            let state = self.inner.state.lock();
            if state.shut_down {
                return if tolerate_failures {
                    Ok(ServiceHealthStatus::unhealthy(
                        name,
                        false,
                        "Service registry is shut down".to_string(),
                        None,
                        HealthSource::Registry,
                    ))
                } else {
                    Err(DiError::RegistryShutdown)
                };
            }
            state.lookup(name)?.clone()
        };

        let resolve_started = Instant::now();
        let resolved = match scope {
            Some(scope) => self.resolve_in(&descriptor.name, scope),
            None => self.resolve_with(&descriptor.name, &self.inner.root, &[]),
        };
        let resolve_duration = resolve_started.elapsed();
        let instance = match resolved {
            Ok(instance) => instance,
            Err(error) if tolerate_failures => {
                return Ok(ServiceHealthStatus::unhealthy(
                    descriptor.name.clone(),
                    descriptor.critical,
                    format!("Resolution failed: {}", error),
                    Some(resolve_duration),
                    HealthSource::Resolution,
                ));
            }
            Err(error) => return Err(error),
        };

        let Some(check) = &descriptor.health_check else {
            return Ok(ServiceHealthStatus {
                name: descriptor.name.clone(),
                healthy: true,
                critical: descriptor.critical,
                details: None,
                checked: false,
                timestamp: SystemTime::now(),
                resolve_duration: Some(resolve_duration),
                check_duration: None,
                source: HealthSource::Resolution,
            });
        };

        let check_started = Instant::now();
        let outcome = guard::catch(|| check(&instance, self));
        let measured = check_started.elapsed();
        let status = match outcome {
            Ok(Ok(outcome)) => {
                let result = HealthCheckResult::from(outcome);
                ServiceHealthStatus {
                    name: descriptor.name.clone(),
                    healthy: result.healthy,
                    critical: descriptor.critical,
                    details: result.details,
                    checked: true,
                    timestamp: SystemTime::now(),
                    resolve_duration: Some(resolve_duration),
                    check_duration: Some(result.duration.unwrap_or(measured)),
                    source: HealthSource::HealthCheck,
                }
            }
            Ok(Err(failure)) => self.failed_check(&descriptor.name, descriptor.critical, failure.to_string(), resolve_duration),
            Err(panic) => self.failed_check(
                &descriptor.name,
                descriptor.critical,
                format!("health check panicked: {}", panic),
                resolve_duration,
            ),
        };
        if !status.healthy {
            tracing::warn!(service = %status.name, critical = status.critical, details = ?status.details, "service unhealthy");
        }
        Ok(status)
    }

    fn failed_check(
        &self,
        name: &str,
        critical: bool,
        message: String,
        resolve_duration: Duration,
    ) -> ServiceHealthStatus {
        ServiceHealthStatus {
            checked: true,
            ..ServiceHealthStatus::unhealthy(
                name,
                critical,
                format!("Health check failed: {}", message),
                Some(resolve_duration),
                HealthSource::Resolution,
            )
        }
    }

    /// Tolerant health check of every service in the root scope. Empty once
    /// the registry is shut down.
    pub fn health_snapshot(&self) -> Vec<ServiceHealthStatus> {
        if self.is_shut_down() {
            return Vec::new();
        }
        let root = self.root_scope();
        self.health_snapshot_with(Some(&root), true).unwrap_or_default()
    }

    /// Health of every registered service, sorted by name.
    ///
    /// With `tolerate_failures`, errors become unhealthy statuses; otherwise
    /// the first error is returned.
    pub fn health_snapshot_with(
        &self,
        scope: Option<&ServiceScope>,
        tolerate_failures: bool,
    ) -> DiResult<Vec<ServiceHealthStatus>> {
        let services: Vec<(String, bool)> = {
            let state = self.inner.state.lock();
            let mut services: Vec<(String, bool)> = state
                .descriptors
                .values()
                .map(|descriptor| (descriptor.name.clone(), descriptor.critical))
                .collect();
            services.sort();
            services
        };

        let mut statuses = Vec::with_capacity(services.len());
        for (name, critical) in services {
            match self.check_health(&name, scope, tolerate_failures) {
                Ok(status) => statuses.push(status),
                Err(error) if tolerate_failures => statuses.push(ServiceHealthStatus::unhealthy(
                    name,
                    critical,
                    format!("Health snapshot failed: {}", error),
                    None,
                    HealthSource::Snapshot,
                )),
                Err(error) => return Err(error),
            }
        }
        Ok(statuses)
    }

    /// True when no critical service reports unhealthy.
    pub fn critical_services_healthy(&self) -> bool {
        self.health_snapshot().iter().all(ServiceHealthStatus::is_acceptable)
    }
}

