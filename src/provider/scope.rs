//! Scoped instance caches and their disposal.
//!
//! A [`ServiceScope`] caches instances of `Scoped` services and instances
//! attached from outside. Closing it releases every instance and runs their
//! shutdown callbacks, newest first.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptors::{CloseFn, OnClose};
use crate::error::{DiError, DiResult};
use crate::internal::{run_hooks, ShutdownHook, SlotId};
use crate::registration::{validate_name, AnyArc};
use crate::traits::Resolver;

use super::ServiceRegistry;

pub(crate) const ROOT_SCOPE_NAME: &str = "root";

struct ScopeState {
    instances: HashMap<String, AnyArc>,
    hooks: HashMap<String, ShutdownHook>,
    closed: bool,
}

/// Storage shared by every handle to one scope.
pub(crate) struct ScopeInner {
    name: String,
    slot: Option<SlotId>,
    parent: Option<Arc<ScopeInner>>,
    state: Mutex<ScopeState>,
}

/// Result of [`ScopeInner::store`].
pub(crate) enum Stored {
    /// The offered instance was cached
    Fresh(AnyArc),
    /// Another resolution stored first; its instance wins
    Existing(AnyArc),
    /// The scope is closed; the offered instance is handed back undisposed
    Closed(AnyArc),
}

impl ScopeInner {
    pub(crate) fn new(name: String, slot: Option<SlotId>, parent: Option<Arc<ScopeInner>>) -> Self {
        Self {
            name,
            slot,
            parent,
            state: Mutex::new(ScopeState {
                instances: HashMap::new(),
                hooks: HashMap::new(),
                closed: false,
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn ensure_open(&self) -> DiResult<()> {
        if self.is_closed() {
            Err(DiError::ScopeClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn cached(&self, name: &str) -> Option<AnyArc> {
        self.state.lock().instances.get(name).cloned()
    }

    /// First writer wins. Runs no callbacks, so it may be called while the
    /// registry lock is held.
    pub(crate) fn store(&self, name: &str, instance: AnyArc, on_close: Option<&CloseFn>) -> Stored {
        let mut state = self.state.lock();
        if state.closed {
            return Stored::Closed(instance);
        }
        if let Some(existing) = state.instances.get(name) {
            return Stored::Existing(existing.clone());
        }
        state.instances.insert(name.to_string(), instance.clone());
        if let Some(callback) = on_close {
            state
                .hooks
                .insert(name.to_string(), ShutdownHook::new(callback.clone(), instance.clone()));
        }
        Stored::Fresh(instance)
    }

    /// Removes one entry, returning its instance and shutdown hook.
    pub(crate) fn take(&self, name: &str) -> (Option<AnyArc>, Option<ShutdownHook>) {
        let mut state = self.state.lock();
        let instance = state.instances.remove(name);
        let hook = state.hooks.remove(name);
        (instance, hook)
    }

    /// Marks the scope closed and runs its callbacks. Returns false if it
    /// was already closed.
    pub(crate) fn close(&self) -> bool {
        let (hooks, instances) = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            let hooks: Vec<(String, ShutdownHook)> = state.hooks.drain().collect();
            (hooks, std::mem::take(&mut state.instances))
        };
        tracing::debug!(scope = %self.name, callbacks = hooks.len(), "closing scope");
        run_hooks(hooks);
        drop(instances);
        true
    }

    fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().instances.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed && !state.hooks.is_empty() {
            tracing::warn!(
                scope = %self.name,
                pending = state.hooks.len(),
                "scope dropped without close(); shutdown callbacks were not run"
            );
        }
    }
}

/// Handle to a scope created by [`ServiceRegistry::create_scope`].
///
/// Cloning the handle is cheap; all clones refer to the same scope.
///
/// ```rust
/// use ferrous_registry::{OnClose, Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Session { user: String }
///
/// let registry = ServiceRegistry::new();
/// let closed = Arc::new(AtomicUsize::new(0));
/// let counter = closed.clone();
/// registry.register(
///     ServiceDescriptor::scoped("session", |_| Ok(Session { user: "ada".into() }))
///         .on_close(OnClose::new(move |_: &Session| { counter.fetch_add(1, Ordering::SeqCst); })),
/// ).unwrap();
///
/// let scope = registry.create_scope(Some("request"), None).unwrap();
/// assert_eq!(scope.require::<Session>("session").unwrap().user, "ada");
/// assert_eq!(scope.snapshot(), vec!["session"]);
///
/// scope.close();
/// scope.close();
/// assert_eq!(closed.load(Ordering::SeqCst), 1);
/// assert!(scope.resolve("session").is_err());
/// ```
#[derive(Clone)]
pub struct ServiceScope {
    pub(crate) registry: ServiceRegistry,
    pub(crate) inner: Arc<ScopeInner>,
}

impl ServiceScope {
    pub(crate) fn new(registry: ServiceRegistry, inner: Arc<ScopeInner>) -> Self {
        Self { registry, inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<ServiceScope> {
        self.inner
            .parent
            .as_ref()
            .map(|parent| ServiceScope::new(self.registry.clone(), parent.clone()))
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn is_root(&self) -> bool {
        self.inner.slot.is_none()
    }

    /// Stores an externally created instance under `name`.
    ///
    /// With `replace`, the previous entry's shutdown callback runs after the
    /// new instance is in place.
    pub fn attach_instance<T>(
        &self,
        name: &str,
        instance: Arc<T>,
        on_close: Option<OnClose>,
        replace: bool,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
    {
        let name = validate_name(name)?;
        let instance: AnyArc = instance;
        let previous = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DiError::ScopeClosed(self.inner.name.clone()));
            }
            if state.instances.contains_key(&name) && !replace {
                return Err(DiError::DuplicateInstance {
                    scope: self.inner.name.clone(),
                    name,
                });
            }
            let previous = state.hooks.remove(&name);
            state.instances.insert(name.clone(), instance.clone());
            if let Some(callback) = on_close {
                state.hooks.insert(name.clone(), ShutdownHook::new(callback.0, instance));
            }
            previous
        };
        if let Some(hook) = previous {
            hook.invoke(&name);
        }
        Ok(())
    }

    /// Removes `name` from the scope, running its callback when `dispose`.
    pub fn detach_instance(&self, name: &str, dispose: bool) -> DiResult<Option<AnyArc>> {
        self.inner.ensure_open()?;
        let (instance, hook) = self.inner.take(name);
        if dispose {
            if let Some(hook) = hook {
                hook.invoke(name);
            }
        }
        Ok(instance)
    }

    /// The instance cached under `name`, without resolving anything.
    pub fn get(&self, name: &str) -> DiResult<AnyArc> {
        let state = self.inner.state.lock();
        if state.closed {
            return Err(DiError::ScopeClosed(self.inner.name.clone()));
        }
        state.instances.get(name).cloned().ok_or_else(|| DiError::InstanceNotFound {
            scope: self.inner.name.clone(),
            name: name.to_string(),
        })
    }

    /// Closes the scope. Calling it again does nothing.
    pub fn close(&self) {
        if self.inner.close() {
            if let Some(slot) = self.inner.slot {
                self.registry.release_scope(slot);
            }
        }
    }

    /// Sorted names of the instances currently held.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.snapshot()
    }
}

impl Resolver for ServiceScope {
    fn resolve(&self, name: &str) -> DiResult<AnyArc> {
        self.inner.ensure_open()?;
        self.registry.resolve_with(name, &self.inner, &[])
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope")
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(|p| p.name.as_str()))
            .field("closed", &self.is_closed())
            .finish()
    }
}
