//! Registry state and registration-time validation.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::internal::{ShutdownHook, SlotTable};
use crate::lifetime::Lifetime;
use crate::metrics::ServiceRuntimeMetrics;
use crate::module::{normalize_names, InstalledModule};
use crate::observer::{Observers, ResolutionHistory};
use crate::provider::ScopeInner;
use crate::resilience::ResiliencePolicy;

/// Type-erased shared instance.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Everything guarded by the registry lock.
pub(crate) struct RegistryState {
    pub(crate) descriptors: HashMap<String, Arc<ServiceDescriptor>>,
    /// alias -> canonical name
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) singletons: HashMap<String, AnyArc>,
    pub(crate) singleton_hooks: HashMap<String, ShutdownHook>,
    pub(crate) metrics: HashMap<String, ServiceRuntimeMetrics>,
    pub(crate) history: ResolutionHistory,
    pub(crate) observers: Observers,
    pub(crate) scopes: SlotTable<ScopeInner>,
    /// Installation order
    pub(crate) modules: Vec<InstalledModule>,
    pub(crate) default_resilience: Option<ResiliencePolicy>,
    pub(crate) shut_down: bool,
}

/// A service taken out of the registry whose resources still need releasing.
pub(crate) struct RemovedService {
    pub(crate) name: String,
    pub(crate) lifetime: Lifetime,
    pub(crate) singleton_hook: Option<ShutdownHook>,
}

impl RegistryState {
    pub(crate) fn new(history_capacity: usize, default_resilience: Option<ResiliencePolicy>) -> Self {
        Self {
            descriptors: HashMap::new(),
            aliases: HashMap::new(),
            singletons: HashMap::new(),
            singleton_hooks: HashMap::new(),
            metrics: HashMap::new(),
            history: ResolutionHistory::with_capacity(history_capacity),
            observers: Observers::default(),
            scopes: SlotTable::new(),
            modules: Vec::new(),
            default_resilience,
            shut_down: false,
        }
    }

    pub(crate) fn ensure_active(&self) -> DiResult<()> {
        if self.shut_down {
            Err(DiError::RegistryShutdown)
        } else {
            Ok(())
        }
    }

    /// Maps a name or alias to the registered descriptor.
    pub(crate) fn lookup(&self, name: &str) -> DiResult<&Arc<ServiceDescriptor>> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.descriptors
            .get(canonical)
            .ok_or_else(|| DiError::NotFound(name.to_string()))
    }

    /// Checks that `descriptor` can be inserted. Nothing is mutated.
    pub(crate) fn check_insert(&self, descriptor: &ServiceDescriptor, replace: bool) -> DiResult<bool> {
        let name = &descriptor.name;
        if let Some(owner) = self.aliases.get(name) {
            return Err(DiError::AliasConflict(format!(
                "'{}' is already an alias of service '{}'",
                name, owner
            )));
        }
        let exists = self.descriptors.contains_key(name);
        if exists && !replace {
            return Err(DiError::AlreadyRegistered(name.clone()));
        }
        for alias in &descriptor.aliases {
            if self.descriptors.contains_key(alias) {
                return Err(DiError::AliasConflict(format!(
                    "alias '{}' is already a registered service",
                    alias
                )));
            }
            match self.aliases.get(alias) {
                Some(owner) if owner != name => {
                    return Err(DiError::AliasConflict(format!(
                        "alias '{}' already refers to service '{}'",
                        alias, owner
                    )));
                }
                _ => {}
            }
        }
        Ok(exists)
    }

    /// Removes a service with its aliases, cached singleton and metrics.
    pub(crate) fn remove(&mut self, name: &str) -> Option<RemovedService> {
        let descriptor = self.descriptors.remove(name)?;
        self.aliases.retain(|_, target| target != name);
        self.singletons.remove(name);
        self.metrics.remove(name);
        Some(RemovedService {
            name: name.to_string(),
            lifetime: descriptor.lifetime,
            singleton_hook: self.singleton_hooks.remove(name),
        })
    }
}

/// Rejects empty or whitespace-only names; returns the trimmed name.
pub(crate) fn validate_name(name: &str) -> DiResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DiError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Normalizes names, aliases and dependencies in place and checks the
/// rules that need no registry state.
pub(crate) fn normalize_descriptor(descriptor: &mut ServiceDescriptor) -> DiResult<()> {
    descriptor.name = validate_name(&descriptor.name)?;
    descriptor.aliases = normalize_names(std::mem::take(&mut descriptor.aliases));
    descriptor.dependencies = normalize_names(std::mem::take(&mut descriptor.dependencies));

    let name = &descriptor.name;
    if descriptor.aliases.iter().any(|alias| alias == name) {
        return Err(DiError::InvalidArgument(format!(
            "alias '{}' cannot equal its own service name",
            name
        )));
    }
    if let Some(dependency) = descriptor
        .dependencies
        .iter()
        .find(|dep| *dep == name || descriptor.aliases.contains(dep))
    {
        return Err(DiError::InvalidArgument(format!(
            "service '{}' cannot depend on itself (via '{}')",
            name, dependency
        )));
    }
    if descriptor.contract.as_ref().is_some_and(|contract| contract.is_empty()) {
        return Err(DiError::InvalidContract(name.clone()));
    }
    Ok(())
}
