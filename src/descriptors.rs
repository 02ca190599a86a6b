//! Service descriptors: what a registration declares about a service.

use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{FailureKind, ServiceFailure};
use crate::health::HealthOutcome;
use crate::lifetime::Lifetime;
use crate::provider::{ResolverContext, ServiceRegistry};
use crate::registration::AnyArc;
use crate::resilience::ResiliencePolicy;
use crate::traits::Dispose;

pub(crate) type FactoryFn =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> Result<AnyArc, ServiceFailure> + Send + Sync>;
pub(crate) type CloseFn = Arc<dyn Fn(&AnyArc) + Send + Sync>;
pub(crate) type ValidatorFn = Arc<dyn Fn(&AnyArc, &ServiceRegistry) -> Result<(), ServiceFailure> + Send + Sync>;
pub(crate) type HealthCheckFn =
    Arc<dyn Fn(&AnyArc, &ServiceRegistry) -> Result<HealthOutcome, ServiceFailure> + Send + Sync>;

/// Shutdown callback run when a cached instance is released.
///
/// Singleton callbacks fire on replace, unregister or shutdown; scoped and
/// attached-instance callbacks fire when their scope closes or the entry is
/// detached.
///
/// ```rust
/// use ferrous_registry::{OnClose, Dispose};
///
/// struct Pool;
/// impl Dispose for Pool {
///     fn dispose(&self) {}
/// }
///
/// let typed = OnClose::new(|pool: &Pool| pool.dispose());
/// let same = OnClose::dispose::<Pool>();
/// # let _ = (typed, same);
/// ```
#[derive(Clone)]
pub struct OnClose(pub(crate) CloseFn);

impl OnClose {
    /// Callback receiving the instance as `&T`.
    ///
    /// An instance of another type is not passed to `f`; the mismatch is
    /// logged instead.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        OnClose(Arc::new(move |instance: &AnyArc| match instance.downcast_ref::<T>() {
            Some(value) => f(value),
            None => tracing::warn!(
                expected = std::any::type_name::<T>(),
                "shutdown callback skipped: instance has a different type"
            ),
        }))
    }

    /// Calls [`Dispose::dispose`] on the instance.
    pub fn dispose<T: Dispose>() -> Self {
        Self::new(|instance: &T| instance.dispose())
    }

    /// Callback receiving the type-erased instance.
    pub fn any<F>(f: F) -> Self
    where
        F: Fn(&AnyArc) + Send + Sync + 'static,
    {
        OnClose(Arc::new(f))
    }
}

impl fmt::Debug for OnClose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnClose(..)")
    }
}

/// Set of concrete types a resolved instance must be one of.
///
/// ```rust
/// use ferrous_registry::{AnyArc, Contract};
/// use std::sync::Arc;
///
/// let contract = Contract::of::<String>().or::<&'static str>();
/// assert!(contract.accepts(&(Arc::new(String::from("ok")) as AnyArc)));
/// assert!(!contract.accepts(&(Arc::new(7u32) as AnyArc)));
/// assert_eq!(contract.describe(), "alloc::string::String | &str");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contract {
    accepted: Vec<(TypeId, &'static str)>,
}

impl Contract {
    /// An empty contract. Registering it fails with `InvalidContract`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<T: Any>() -> Self {
        Self::new().or::<T>()
    }

    pub fn or<T: Any>(mut self) -> Self {
        let id = TypeId::of::<T>();
        if !self.accepted.iter().any(|(accepted, _)| *accepted == id) {
            self.accepted.push((id, std::any::type_name::<T>()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn accepts(&self, value: &AnyArc) -> bool {
        let actual = Any::type_id(&**value);
        self.accepted.iter().any(|(id, _)| *id == actual)
    }

    pub fn describe(&self) -> String {
        self.accepted
            .iter()
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Declaration of one registered service.
///
/// Built with a lifetime constructor and chained builder calls, then handed
/// to [`ServiceRegistry::register`].
///
/// ```rust
/// use ferrous_registry::{Contract, Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Client { config: Arc<Config> }
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::instance("config", Config { url: "db://local".into() })).unwrap();
/// registry.register(
///     ServiceDescriptor::singleton("client", |ctx| {
///         Ok(Client { config: ctx.require::<Config>("config")? })
///     })
///     .with_dependencies(["config"])
///     .with_aliases(["db.client"])
///     .with_tags(["storage"])
///     .contract(Contract::of::<Client>())
///     .critical(),
/// ).unwrap();
///
/// let client = registry.require::<Client>("db.client").unwrap();
/// assert_eq!(client.config.url, "db://local");
/// ```
pub struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) factory: FactoryFn,
    pub(crate) lifetime: Lifetime,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) eager: bool,
    pub(crate) on_close: Option<CloseFn>,
    pub(crate) aliases: Vec<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) contract: Option<Contract>,
    pub(crate) validator: Option<ValidatorFn>,
    pub(crate) resilience: Option<ResiliencePolicy>,
    pub(crate) health_check: Option<HealthCheckFn>,
    pub(crate) critical: bool,
    pub(crate) impl_type: Option<(TypeId, &'static str)>,
    pub(crate) preset: Option<AnyArc>,
}

impl ServiceDescriptor {
    pub fn singleton<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<T, ServiceFailure> + Send + Sync + 'static,
    {
        Self::with_lifetime(name, Lifetime::Singleton, factory)
    }

    pub fn transient<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<T, ServiceFailure> + Send + Sync + 'static,
    {
        Self::with_lifetime(name, Lifetime::Transient, factory)
    }

    pub fn scoped<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<T, ServiceFailure> + Send + Sync + 'static,
    {
        Self::with_lifetime(name, Lifetime::Scoped, factory)
    }

    /// Typed factory with an explicit lifetime.
    pub fn with_lifetime<T, F>(name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<T, ServiceFailure> + Send + Sync + 'static,
    {
        let mut descriptor = Self::dynamic(name, lifetime, move |ctx| {
            factory(ctx).map(|value| Arc::new(value) as AnyArc)
        });
        descriptor.impl_type = Some((TypeId::of::<T>(), std::any::type_name::<T>()));
        descriptor
    }

    /// Factory producing an already type-erased value.
    pub fn dynamic<F>(name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<AnyArc, ServiceFailure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            lifetime,
            tags: BTreeSet::new(),
            eager: false,
            on_close: None,
            aliases: Vec::new(),
            dependencies: Vec::new(),
            contract: None,
            validator: None,
            resilience: None,
            health_check: None,
            critical: false,
            impl_type: None,
            preset: None,
        }
    }

    /// A singleton whose instance already exists.
    ///
    /// Contract and validator run against the value at registration time and
    /// the value is cached immediately.
    pub fn instance<T>(name: impl Into<String>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::shared_instance(name, Arc::new(value))
    }

    pub fn shared_instance<T>(name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let preset: AnyArc = value;
        let constant = preset.clone();
        let mut descriptor = Self::dynamic(name, Lifetime::Singleton, move |_| Ok(constant.clone()));
        descriptor.impl_type = Some((TypeId::of::<T>(), std::any::type_name::<T>()));
        descriptor.preset = Some(preset);
        descriptor
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Services resolved, in order, before every factory attempt.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Resolve right after registration.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn on_close(mut self, callback: OnClose) -> Self {
        self.on_close = Some(callback.0);
        self
    }

    /// Shorthand for `on_close(OnClose::dispose::<T>())`.
    pub fn dispose_on_close<T: Dispose>(self) -> Self {
        self.on_close(OnClose::dispose::<T>())
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Post-creation check. A failure is terminal and never retried.
    pub fn validator<T, F>(mut self, validator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &ServiceRegistry) -> Result<(), ServiceFailure> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(move |instance: &AnyArc, registry: &ServiceRegistry| {
            match instance.downcast_ref::<T>() {
                Some(value) => validator(value, registry),
                None => Err(ServiceFailure::new(
                    FailureKind::Configuration,
                    format!("validator expects {}", std::any::type_name::<T>()),
                )),
            }
        }));
        self
    }

    /// Health probe run by `check_health` after the service resolves.
    pub fn health_check<T, O, F>(mut self, check: F) -> Self
    where
        T: Send + Sync + 'static,
        O: Into<HealthOutcome>,
        F: Fn(&T, &ServiceRegistry) -> Result<O, ServiceFailure> + Send + Sync + 'static,
    {
        self.health_check = Some(Arc::new(move |instance: &AnyArc, registry: &ServiceRegistry| {
            match instance.downcast_ref::<T>() {
                Some(value) => check(value, registry).map(Into::into),
                None => Ok(HealthOutcome::failing(format!(
                    "health check expects {}",
                    std::any::type_name::<T>()
                ))),
            }
        }));
        self
    }

    pub fn resilience(mut self, policy: ResiliencePolicy) -> Self {
        self.resilience = Some(policy);
        self
    }

    /// Marks the service as required for `critical_services_healthy`.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn has_on_close(&self) -> bool {
        self.on_close.is_some()
    }

    pub fn has_health_check(&self) -> bool {
        self.health_check.is_some()
    }

    pub fn resilience_policy(&self) -> Option<&ResiliencePolicy> {
        self.resilience.as_ref()
    }

    /// Concrete type produced by a typed constructor.
    pub fn impl_type_name(&self) -> Option<&'static str> {
        self.impl_type.map(|(_, name)| name)
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.resilience.as_ref().map_or(1, ResiliencePolicy::max_attempts)
    }

    /// Best-effort type name of a value this descriptor produced.
    pub(crate) fn describe_value(&self, value: &AnyArc) -> &'static str {
        match self.impl_type {
            Some((id, name)) if id == Any::type_id(&**value) => name,
            _ => "an unnamed type",
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("lifetime", &self.lifetime)
            .field("tags", &self.tags)
            .field("aliases", &self.aliases)
            .field("dependencies", &self.dependencies)
            .field("eager", &self.eager)
            .field("critical", &self.critical)
            .field("contract", &self.contract)
            .field("resilience", &self.resilience)
            .field("impl_type", &self.impl_type_name())
            .finish_non_exhaustive()
    }
}
