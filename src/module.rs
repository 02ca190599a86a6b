//! Service modules: named bundles of registrations installed as a unit.

use crate::error::DiResult;
use crate::provider::ServiceRegistry;

/// A named group of registrations.
///
/// Modules may depend on other modules by name; those must be installed
/// first. If `configure` fails, every service it registered is removed again.
///
/// # Example
///
/// ```rust
/// use ferrous_registry::{DiResult, Resolver, ServiceDescriptor, ServiceModule, ServiceRegistry};
///
/// struct StorageModule;
///
/// impl ServiceModule for StorageModule {
///     fn name(&self) -> &str {
///         "storage"
///     }
///
///     fn configure(&self, registry: &ServiceRegistry) -> DiResult<()> {
///         registry.register(ServiceDescriptor::singleton("storage.path", |_| Ok(String::from("/tmp/data"))))?;
///         Ok(())
///     }
/// }
///
/// # fn main() -> DiResult<()> {
/// let registry = ServiceRegistry::new();
/// registry.install_module(&StorageModule, false)?;
/// assert_eq!(registry.installed_modules(), vec!["storage"]);
/// assert_eq!(*registry.require::<String>("storage.path")?, "/tmp/data");
/// # Ok(())
/// # }
/// ```
pub trait ServiceModule: Send + Sync {
    fn name(&self) -> &str;

    /// Registers this module's services.
    fn configure(&self, registry: &ServiceRegistry) -> DiResult<()>;

    /// Modules that must already be installed.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn description(&self) -> Option<&str> {
        None
    }
}

/// Closure-backed [`ServiceModule`].
///
/// ```rust
/// use ferrous_registry::{FnModule, ServiceDescriptor, ServiceRegistry};
///
/// let registry = ServiceRegistry::new();
/// let core = FnModule::new("core", |registry| {
///     registry.register(ServiceDescriptor::instance("core.version", 3u32))
/// })
/// .with_description("Core services");
/// let ui = FnModule::new("ui", |_| Ok(())).with_dependencies(["core"]);
///
/// assert!(registry.install_module(&ui, false).is_err());
/// registry.install_module(&core, false).unwrap();
/// registry.install_module(&ui, false).unwrap();
/// assert_eq!(registry.installed_modules(), vec!["core", "ui"]);
/// ```
pub struct FnModule<F> {
    name: String,
    configure: F,
    dependencies: Vec<String>,
    description: Option<String>,
}

impl<F> FnModule<F>
where
    F: Fn(&ServiceRegistry) -> DiResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, configure: F) -> Self {
        Self {
            name: name.into(),
            configure,
            dependencies: Vec::new(),
            description: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl<F> ServiceModule for FnModule<F>
where
    F: Fn(&ServiceRegistry) -> DiResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, registry: &ServiceRegistry) -> DiResult<()> {
        (self.configure)(registry)
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Bookkeeping for an installed module.
#[derive(Debug, Clone)]
pub(crate) struct InstalledModule {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) description: Option<String>,
}

/// Trims, drops blanks and removes duplicates, keeping first occurrence order.
pub(crate) fn normalize_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if !trimmed.is_empty() && !normalized.iter().any(|n| n == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}
