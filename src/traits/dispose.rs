//! Disposal trait for resource cleanup.

/// Synchronous teardown for services holding resources.
///
/// Pair it with [`OnClose::dispose`](crate::OnClose::dispose) or
/// [`ServiceDescriptor::dispose_on_close`](crate::ServiceDescriptor::dispose_on_close)
/// so the registry calls it when the instance is released.
///
/// # Examples
///
/// ```
/// use ferrous_registry::{Dispose, Resolver, ServiceDescriptor, ServiceRegistry};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// static FLUSHED: AtomicBool = AtomicBool::new(false);
///
/// struct Cache;
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         FLUSHED.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("cache", |_| Ok(Cache)).dispose_on_close::<Cache>()).unwrap();
/// registry.resolve("cache").unwrap();
/// registry.shutdown();
/// assert!(FLUSHED.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}
