//! The service registry.
//!
//! [`ServiceRegistry`] owns the descriptors, the singleton cache, the live
//! scope table, metrics, the resolution history and the observers, all behind
//! one `parking_lot` mutex. The lock is only ever held around map access;
//! factories, validators, fallbacks, health checks, observers and shutdown
//! callbacks run without it, which is what lets a factory resolve further
//! services through its [`ResolverContext`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::internal::journal::{self, InstallJournal};
use crate::internal::{run_hooks, ShutdownHook, SlotId};
use crate::lifetime::Lifetime;
use crate::metrics::ServiceRuntimeMetrics;
use crate::module::{normalize_names, InstalledModule, ServiceModule};
use crate::observer::{InsightsObserver, ResolutionObserver};
use crate::registration::{normalize_descriptor, validate_name, AnyArc, RegistryState, RemovedService};
use crate::resilience::ResiliencePolicy;
use crate::traits::Resolver;

mod context;
mod diagnostics;
mod resolution;
mod scope;

pub use context::ResolverContext;
pub use scope::ServiceScope;
pub(crate) use scope::ScopeInner;

use scope::ROOT_SCOPE_NAME;

/// Thread-safe registry of named services.
///
/// Cloning is cheap: every clone shares the same state.
///
/// # Examples
///
/// ```
/// use ferrous_registry::{Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Config { retries: u32 }
/// struct AppState { config: Arc<Config> }
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("config", |_| Ok(Config { retries: 3 }))).unwrap();
/// registry.register(
///     ServiceDescriptor::singleton("app_state", |ctx| Ok(AppState { config: ctx.require("config")? }))
///         .with_dependencies(["config"]),
/// ).unwrap();
///
/// let state = registry.require::<AppState>("app_state").unwrap();
/// assert_eq!(state.config.retries, 3);
///
/// let events = registry.resolution_history();
/// assert_eq!(events.len(), 3);
/// assert_eq!(events[0].name, "config");
/// assert!(!events[0].from_cache);
/// assert_eq!(events[2].name, "app_state");
///
/// registry.shutdown();
/// assert!(registry.resolve("config").is_err());
/// ```
#[derive(Clone)]
pub struct ServiceRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub(crate) state: Mutex<RegistryState>,
    pub(crate) root: Arc<ScopeInner>,
    slow_threshold: Duration,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::build(RegistryConfig::default(), None)
    }

    /// Registry configured from `config`. Fails if the default resilience
    /// settings are invalid.
    pub fn with_config(config: RegistryConfig) -> DiResult<Self> {
        let policy = config.default_policy()?;
        Ok(Self::build(config, policy))
    }

    fn build(config: RegistryConfig, default_resilience: Option<ResiliencePolicy>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::new(config.history_capacity, default_resilience)),
                root: Arc::new(ScopeInner::new(ROOT_SCOPE_NAME.to_string(), None, None)),
                slow_threshold: config.slow_resolution_threshold(),
            }),
        }
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Registers a service. Fails if the name is already taken.
    pub fn register(&self, descriptor: ServiceDescriptor) -> DiResult<()> {
        self.register_inner(descriptor, false)
    }

    /// Registers a service, replacing and disposing any previous one.
    pub fn replace(&self, descriptor: ServiceDescriptor) -> DiResult<()> {
        self.register_inner(descriptor, true)
    }

    /// Registers a descriptor built with [`ServiceDescriptor::instance`].
    pub fn register_instance(&self, descriptor: ServiceDescriptor) -> DiResult<()> {
        if descriptor.preset.is_none() {
            return Err(DiError::InvalidArgument(format!(
                "service '{}' was not built from an instance",
                descriptor.name
            )));
        }
        self.register_inner(descriptor, false)
    }

    fn register_inner(&self, mut descriptor: ServiceDescriptor, replace: bool) -> DiResult<()> {
        normalize_descriptor(&mut descriptor)?;
        if let Some(preset) = descriptor.preset.clone() {
            self.check_instance(&descriptor, &preset)?;
        }
        if descriptor.lifetime == Lifetime::Transient && descriptor.on_close.is_some() {
            tracing::warn!(
                service = %descriptor.name,
                "transient service has a shutdown callback; it will never run automatically"
            );
        }

        let name = descriptor.name.clone();
        let lifetime = descriptor.lifetime;
        let eager = descriptor.eager;
        let (replaced, displaced) = {
            let mut state = self.inner.state.lock();
            state.ensure_active()?;
            let exists = state.check_insert(&descriptor, replace)?;
            if descriptor.resilience.is_none() {
                descriptor.resilience = state.default_resilience.clone();
            }
            let displaced = if exists { state.remove(&name) } else { None };

            let descriptor = Arc::new(descriptor);
            for alias in &descriptor.aliases {
                state.aliases.insert(alias.clone(), name.clone());
            }
            if let Some(preset) = &descriptor.preset {
                state.singletons.insert(name.clone(), preset.clone());
                if let Some(callback) = &descriptor.on_close {
                    state
                        .singleton_hooks
                        .insert(name.clone(), ShutdownHook::new(callback.clone(), preset.clone()));
                }
            }
            state.metrics.insert(name.clone(), ServiceRuntimeMetrics::default());
            state.descriptors.insert(name.clone(), descriptor);
            (exists, displaced)
        };

        if !replaced {
            journal::record(self.id(), &name);
        }
        tracing::debug!(service = %name, lifetime = %lifetime, replaced, "service registered");
        if let Some(removed) = displaced {
            self.release_removed(removed);
        }
        if eager {
            self.resolve(&name)?;
        }
        Ok(())
    }

    /// Contract and validator checks for a preset instance.
    fn check_instance(&self, descriptor: &ServiceDescriptor, instance: &AnyArc) -> DiResult<()> {
        if let Some(contract) = &descriptor.contract {
            if !contract.accepts(instance) {
                return Err(DiError::ContractViolation {
                    service: descriptor.name.clone(),
                    expected: contract.describe(),
                    actual: descriptor.describe_value(instance).to_string(),
                });
            }
        }
        if let Some(validator) = &descriptor.validator {
            self.run_validator(descriptor, validator, instance)?;
        }
        Ok(())
    }

    /// Removes a service (by name or alias) with its aliases, cache entry and
    /// metrics. With `dispose`, its singleton callback runs and its scoped
    /// instances are purged from every live scope.
    pub fn unregister(&self, name: &str, dispose: bool) -> DiResult<()> {
        let removed = {
            let mut state = self.inner.state.lock();
            state.ensure_active()?;
            let canonical = state.lookup(name)?.name.clone();
            state.remove(&canonical)
        };
        if let Some(removed) = removed {
            tracing::debug!(service = %removed.name, dispose, "service unregistered");
            if dispose {
                self.release_removed(removed);
            }
        }
        Ok(())
    }

    fn release_removed(&self, removed: RemovedService) {
        if let Some(hook) = removed.singleton_hook {
            hook.invoke(&removed.name);
        }
        if removed.lifetime == Lifetime::Scoped {
            self.purge_scoped(&removed.name);
        }
    }

    /// Drops `name` from the root scope and every live scope, running hooks.
    fn purge_scoped(&self, name: &str) {
        let mut scopes = {
            let mut state = self.inner.state.lock();
            state.scopes.live()
        };
        scopes.push(self.inner.root.clone());
        let hooks: Vec<(String, ShutdownHook)> = scopes
            .iter()
            .filter_map(|scope| scope.take(name).1)
            .map(|hook| (name.to_string(), hook))
            .collect();
        run_hooks(hooks);
    }

    pub fn set_default_resilience_policy(&self, policy: Option<ResiliencePolicy>) {
        self.inner.state.lock().default_resilience = policy;
    }

    pub fn default_resilience_policy(&self) -> Option<ResiliencePolicy> {
        self.inner.state.lock().default_resilience.clone()
    }

    /// Resolves `name` in `scope` instead of the root scope.
    pub fn resolve_in(&self, name: &str, scope: &ServiceScope) -> DiResult<AnyArc> {
        self.ensure_owned(scope)?;
        scope.resolve(name)
    }

    fn ensure_owned(&self, scope: &ServiceScope) -> DiResult<()> {
        if Arc::ptr_eq(&self.inner, &scope.registry.inner) {
            Ok(())
        } else {
            Err(DiError::InvalidArgument(format!(
                "scope '{}' belongs to another registry",
                scope.name()
            )))
        }
    }

    /// The scope used when no scope is given.
    pub fn root_scope(&self) -> ServiceScope {
        ServiceScope::new(self.clone(), self.inner.root.clone())
    }

    /// Creates a scope. Names are made unique among live scopes (`scope`,
    /// `scope-1`, ...); `root` is reserved. The parent defaults to the root
    /// scope.
    pub fn create_scope(&self, name: Option<&str>, parent: Option<&ServiceScope>) -> DiResult<ServiceScope> {
        let base = match name {
            Some(name) => validate_name(name)?,
            None => "scope".to_string(),
        };
        let base = if base == ROOT_SCOPE_NAME { "scope".to_string() } else { base };
        let parent = match parent {
            Some(parent) => {
                self.ensure_owned(parent)?;
                parent.inner.ensure_open()?;
                parent.inner.clone()
            }
            None => self.inner.root.clone(),
        };

        let mut state = self.inner.state.lock();
        state.ensure_active()?;
        let live = state.scopes.live();
        let taken: HashSet<&str> = live.iter().map(|scope| scope.name()).collect();
        let mut candidate = base.clone();
        let mut counter = 1;
        while candidate == ROOT_SCOPE_NAME || taken.contains(candidate.as_str()) {
            candidate = format!("{}-{}", base, counter);
            counter += 1;
        }
        let inner = Arc::new_cyclic(|weak| {
            let slot = state.scopes.insert(weak.clone());
            ScopeInner::new(candidate.clone(), Some(slot), Some(parent))
        });
        drop(taken);
        drop(state);
        drop(live);

        tracing::debug!(scope = %candidate, "scope created");
        Ok(ServiceScope::new(self.clone(), inner))
    }

    /// Runs `f` in a fresh scope and closes it afterwards, also when `f`
    /// panics.
    pub fn with_scope<R, F>(&self, name: Option<&str>, f: F) -> DiResult<R>
    where
        F: FnOnce(&ServiceScope) -> R,
    {
        let scope = self.create_scope(name, None)?;
        let _close = CloseOnDrop(&scope);
        Ok(f(&scope))
    }

    pub(crate) fn release_scope(&self, slot: SlotId) {
        self.inner.state.lock().scopes.remove(slot);
    }

    pub fn add_resolution_observer(&self, observer: Arc<dyn ResolutionObserver>) -> DiResult<()> {
        let mut state = self.inner.state.lock();
        state.ensure_active()?;
        if state.observers.add(observer) {
            Ok(())
        } else {
            Err(DiError::ObserverAlreadyRegistered)
        }
    }

    pub fn remove_resolution_observer(&self, observer: &Arc<dyn ResolutionObserver>) -> DiResult<()> {
        if self.inner.state.lock().observers.remove(observer) {
            Ok(())
        } else {
            Err(DiError::ObserverNotRegistered)
        }
    }

    /// Registers an [`InsightsObserver`] using the configured slow-resolution
    /// threshold and returns it.
    pub fn attach_insights(&self) -> DiResult<Arc<InsightsObserver>> {
        let insights = Arc::new(InsightsObserver::new(self.inner.slow_threshold));
        self.add_resolution_observer(insights.clone())?;
        Ok(insights)
    }

    pub fn slow_resolution_threshold(&self) -> Duration {
        self.inner.slow_threshold
    }

    /// Installs `module` after checking that its module dependencies are
    /// installed. Services newly registered by a failing `configure` are
    /// unregistered again.
    pub fn install_module<M>(&self, module: &M, replace: bool) -> DiResult<()>
    where
        M: ServiceModule + ?Sized,
    {
        let name = validate_name(module.name())?;
        let dependencies = normalize_names(module.dependencies());
        {
            let state = self.inner.state.lock();
            state.ensure_active()?;
            let mut missing: Vec<String> = dependencies
                .iter()
                .filter(|dependency| !state.modules.iter().any(|m| &m.name == *dependency))
                .cloned()
                .collect();
            if !missing.is_empty() {
                missing.sort();
                return Err(DiError::ModuleDependencies { module: name, missing });
            }
            if !replace && state.modules.iter().any(|m| m.name == name) {
                return Err(DiError::ModuleAlreadyInstalled(name));
            }
        }

        let journal = InstallJournal::begin(self.id());
        let outcome = module.configure(self);
        let added = journal.finish();

        if let Err(error) = outcome {
            tracing::error!(module = %name, error = %error, rolled_back = added.len(), "module installation failed");
            for service in added.iter().rev() {
                if let Err(e) = self.unregister(service, true) {
                    tracing::debug!(module = %name, service = %service, error = %e, "rollback skipped service");
                }
            }
            return Err(DiError::ModuleInstall {
                module: name,
                source: Box::new(error),
            });
        }

        let record = InstalledModule {
            name: name.clone(),
            dependencies,
            description: module.description().map(str::to_string),
        };
        let mut state = self.inner.state.lock();
        match state.modules.iter_mut().find(|m| m.name == name) {
            Some(existing) => *existing = record,
            None => state.modules.push(record),
        }
        drop(state);
        tracing::debug!(module = %name, services = added.len(), "module installed");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }

    /// Shuts the registry down. Further registration and resolution fail.
    ///
    /// Closes every live scope and the root scope, then runs singleton
    /// shutdown callbacks newest first. Calling it again does nothing.
    pub fn shutdown(&self) {
        let (singleton_hooks, scopes, scoped_services) = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let hooks: Vec<(String, ShutdownHook)> = state.singleton_hooks.drain().collect();
            let scoped: Vec<String> = state
                .descriptors
                .values()
                .filter(|d| d.lifetime == Lifetime::Scoped)
                .map(|d| d.name.clone())
                .collect();
            state.singletons.clear();
            state.descriptors.clear();
            state.aliases.clear();
            state.metrics.clear();
            state.observers.clear();
            (hooks, state.scopes.drain(), scoped)
        };

        let closed = scopes.iter().filter(|scope| scope.close()).count();
        self.inner.root.close();
        run_hooks(singleton_hooks);
        for name in &scoped_services {
            self.purge_scoped(name);
        }
        tracing::info!(scopes = closed, "service registry shut down");
    }
}

/// Closes the borrowed scope when dropped, including during unwinding.
struct CloseOnDrop<'a>(&'a ServiceScope);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for ServiceRegistry {
    fn resolve(&self, name: &str) -> DiResult<AnyArc> {
        self.resolve_with(name, &self.inner.root, &[])
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ServiceRegistry")
            .field("services", &state.descriptors.len())
            .field("modules", &state.modules.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.shut_down && !state.singleton_hooks.is_empty() {
            tracing::warn!(
                pending = state.singleton_hooks.len(),
                "ServiceRegistry dropped without shutdown(); singleton shutdown callbacks were not run"
            );
        }
    }
}
