//! Resolver trait for service resolution.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::registration::AnyArc;

/// Name-based resolution surface shared by the registry, its scopes and the
/// context passed to factories.
///
/// Only [`resolve`](Resolver::resolve) is required; the typed helpers
/// downcast its result.
///
/// # Examples
///
/// ```
/// use ferrous_registry::{DiError, Resolver, ServiceDescriptor, ServiceRegistry};
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::instance("greeting", String::from("hello"))).unwrap();
///
/// let greeting = registry.require::<String>("greeting").unwrap();
/// assert_eq!(*greeting, "hello");
///
/// match registry.require::<u64>("greeting") {
///     Err(DiError::TypeMismatch { service, .. }) => assert_eq!(service, "greeting"),
///     _ => unreachable!(),
/// }
/// assert!(registry.try_require::<String>("absent").unwrap().is_none());
/// ```
pub trait Resolver {
    /// Resolves `name` (or an alias of it) to its type-erased instance.
    fn resolve(&self, name: &str) -> DiResult<AnyArc>;

    /// Resolves `name` and downcasts it to `T`.
    fn require<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.resolve(name)?.downcast::<T>().map_err(|_| DiError::TypeMismatch {
            service: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Like [`require`](Resolver::require), but an unregistered name is `Ok(None)`.
    fn try_require<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Option<Arc<T>>> {
        match self.require::<T>(name) {
            Ok(value) => Ok(Some(value)),
            Err(DiError::NotFound(missing)) if missing == name => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves `name` as `T`, panicking on failure.
    ///
    /// Intended for application wiring where a missing service is a bug.
    fn get_required<T: Send + Sync + 'static>(&self, name: &str) -> Arc<T> {
        self.require::<T>(name)
            .unwrap_or_else(|e| panic!("Failed to resolve '{}' as {}: {}", name, std::any::type_name::<T>(), e))
    }
}
