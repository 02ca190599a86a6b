//! Service lifetime definitions.

use std::fmt;

/// Service lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use ferrous_registry::{Lifetime, Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct Repository { table: String }
/// struct RequestModel { id: u32 }
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("db", |_| {
///     Ok(Database { url: "postgres://localhost".to_string() })
/// })).unwrap();
/// registry.register(ServiceDescriptor::scoped("repo", |_| {
///     Ok(Repository { table: "users".to_string() })
/// })).unwrap();
/// registry.register(ServiceDescriptor::transient("model", |_| Ok(RequestModel { id: 7 }))).unwrap();
///
/// // Singleton: same instance everywhere
/// let scope1 = registry.create_scope(None, None).unwrap();
/// let db1 = registry.require::<Database>("db").unwrap();
/// let db2 = scope1.require::<Database>("db").unwrap();
/// assert!(Arc::ptr_eq(&db1, &db2));
///
/// // Scoped: same within a scope, different across scopes
/// let scope2 = registry.create_scope(None, None).unwrap();
/// let repo1a = scope1.require::<Repository>("repo").unwrap();
/// let repo1b = scope1.require::<Repository>("repo").unwrap();
/// let repo2 = scope2.require::<Repository>("repo").unwrap();
/// assert!(Arc::ptr_eq(&repo1a, &repo1b));
/// assert!(!Arc::ptr_eq(&repo1a, &repo2));
///
/// // Transient: always different
/// let m1 = scope1.require::<RequestModel>("model").unwrap();
/// let m2 = scope1.require::<RequestModel>("model").unwrap();
/// assert!(!Arc::ptr_eq(&m1, &m2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Lifetime {
    /// Single instance per registry, cached until replaced, unregistered or
    /// the registry shuts down.
    #[default]
    Singleton,
    /// New instance per resolution, never cached
    ///
    /// Shutdown callbacks attached to transient services never fire
    /// automatically.
    Transient,
    /// Single instance per [`ServiceScope`](crate::ServiceScope)
    ///
    /// Resolving a scoped service without an explicit scope caches it in the
    /// registry's root scope.
    Scoped,
}

impl Lifetime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Transient => "transient",
            Lifetime::Scoped => "scoped",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
