//! # ferrous-registry
//!
//! Thread-safe registry of named services with lifetimes, dependency
//! resolution, resilience policies, health checks and scoped disposal.
//!
//! ## Features
//!
//! - **Lifetimes**: Singleton, Scoped and Transient services
//! - **Dependency graph**: declared dependencies resolved first, cycles reported with the full chain
//! - **Resilience**: per-service retry with exponential backoff and fallbacks
//! - **Contracts and validators**: created instances are checked before they are cached
//! - **Scopes**: disposable caches whose shutdown callbacks run exactly once
//! - **Observability**: one event per resolution attempt, runtime metrics, topology and health snapshots
//! - **Modules**: grouped registrations with module dependencies and rollback on failure
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_registry::{Resolver, ServiceDescriptor, ServiceRegistry};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let registry = ServiceRegistry::new();
//! registry.register(ServiceDescriptor::singleton("db", |_| {
//!     Ok(Database { connection_string: "postgres://localhost".to_string() })
//! })).unwrap();
//! registry.register(
//!     ServiceDescriptor::transient("users", |ctx| Ok(UserService { db: ctx.require("db")? }))
//!         .with_dependencies(["db"]),
//! ).unwrap();
//!
//! let users = registry.require::<UserService>("users").unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: created once and cached until replaced, unregistered or the registry shuts down
//! - **Scoped**: created once per [`ServiceScope`]
//! - **Transient**: created on every resolution
//!
//! ## Resilience
//!
//! ```rust
//! use ferrous_registry::{FailureKind, ResiliencePolicy, Resolver, ServiceDescriptor, ServiceFailure, ServiceRegistry};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! let calls = Arc::new(AtomicU32::new(0));
//! let counter = calls.clone();
//!
//! let registry = ServiceRegistry::new();
//! registry.register(
//!     ServiceDescriptor::singleton("flaky", move |_| {
//!         if counter.fetch_add(1, Ordering::SeqCst) == 0 {
//!             Err(ServiceFailure::new(FailureKind::Unavailable, "warming up"))
//!         } else {
//!             Ok("ready")
//!         }
//!     })
//!     .resilience(ResiliencePolicy::retry(2).unwrap()),
//! ).unwrap();
//!
//! assert_eq!(*registry.require::<&str>("flaky").unwrap(), "ready");
//! assert_eq!(registry.service_metrics()["flaky"].retries, 1);
//! ```
//!
//! ## Scoped Services
//!
//! ```rust
//! use ferrous_registry::{Resolver, ServiceDescriptor, ServiceRegistry};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! struct RequestId(u32);
//!
//! let next = Arc::new(AtomicU32::new(0));
//! let registry = ServiceRegistry::new();
//! registry.register(ServiceDescriptor::scoped("request_id", move |_| {
//!     Ok(RequestId(next.fetch_add(1, Ordering::SeqCst)))
//! })).unwrap();
//!
//! let scope1 = registry.create_scope(None, None).unwrap();
//! let scope2 = registry.create_scope(None, None).unwrap();
//! let a = scope1.require::<RequestId>("request_id").unwrap();
//! let b = scope2.require::<RequestId>("request_id").unwrap();
//! assert_ne!(a.0, b.0);
//! assert!(Arc::ptr_eq(&a, &scope1.require::<RequestId>("request_id").unwrap()));
//! scope1.close();
//! scope2.close();
//! ```

pub mod config;
pub mod descriptors;
pub mod error;
pub mod health;
pub mod lifetime;
pub mod metrics;
pub mod module;
pub mod observer;
pub mod provider;
pub mod resilience;
pub mod topology;
pub mod traits;

// Internal modules
mod internal;
mod registration;

pub use config::{RegistryConfig, ResilienceConfig, DEFAULT_ENV_PREFIX};
pub use descriptors::{Contract, OnClose, ServiceDescriptor};
pub use error::{DiError, DiResult, FailureKind, ServiceFailure};
pub use health::{HealthCheckResult, HealthOutcome, HealthSource, ServiceHealthStatus};
pub use internal::MAX_RESOLUTION_DEPTH;
pub use lifetime::Lifetime;
pub use metrics::ServiceRuntimeMetrics;
pub use module::{FnModule, ServiceModule};
pub use observer::{
    InsightsObserver, LoggingObserver, ResolutionInsights, ResolutionObserver, ServiceResolutionEvent,
};
pub use provider::{ResolverContext, ServiceRegistry, ServiceScope};
pub use registration::AnyArc;
pub use resilience::{PolicySummary, ResiliencePolicy, ResiliencePolicyBuilder, RetryOn};
pub use topology::ServiceTopology;
pub use traits::{Dispose, Resolver};
