//! Resolver context handed to factories.

use std::sync::Arc;

use crate::error::DiResult;
use crate::registration::AnyArc;
use crate::traits::Resolver;

use super::scope::ScopeInner;
use super::{ServiceRegistry, ServiceScope};

/// What a factory, or fallback, sees of the resolution in progress.
///
/// Resolving through the context keeps the current scope and dependency
/// chain, so nested resolutions take part in cycle detection and cache
/// scoped services in the right scope.
///
/// # Examples
///
/// ```
/// use ferrous_registry::{Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("db", |_| {
///     Ok(Database { url: "postgres://localhost".to_string() })
/// })).unwrap();
/// registry.register(ServiceDescriptor::transient("users", |ctx| {
///     assert_eq!(ctx.service_name(), "users");
///     Ok(UserService { db: ctx.require::<Database>("db")? })
/// })).unwrap();
///
/// let users = registry.require::<UserService>("users").unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub struct ResolverContext<'a> {
    registry: &'a ServiceRegistry,
    scope: &'a Arc<ScopeInner>,
    chain: &'a [String],
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(registry: &'a ServiceRegistry, scope: &'a Arc<ScopeInner>, chain: &'a [String]) -> Self {
        Self { registry, scope, chain }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }

    /// The scope this resolution runs in.
    pub fn scope(&self) -> ServiceScope {
        ServiceScope::new(self.registry.clone(), self.scope.clone())
    }

    pub fn scope_name(&self) -> &str {
        self.scope.name()
    }

    /// Services being resolved on this call stack, outermost first.
    pub fn dependency_chain(&self) -> &[String] {
        self.chain
    }

    /// The service whose factory is running.
    pub fn service_name(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or_default()
    }
}

impl Resolver for ResolverContext<'_> {
    fn resolve(&self, name: &str) -> DiResult<AnyArc> {
        self.registry.resolve_with(name, self.scope, self.chain)
    }
}
