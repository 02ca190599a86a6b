//! Error types for the service registry.

use std::fmt;

use thiserror::Error;

/// Registry errors
///
/// Represents the conditions that can occur while registering, resolving or
/// disposing services. The variants fall into three groups:
///
/// - **Configuration**: bad names, alias collisions, invalid resilience
///   parameters, malformed contracts, module dependency problems. Raised at
///   registration time and never retried.
/// - **Resolution**: unknown services, cycles, factory/fallback failures,
///   contract and validator failures.
/// - **Lifecycle**: operating on a shut-down registry or a closed scope.
///
/// # Examples
///
/// ```rust
/// use ferrous_registry::{DiError, ServiceRegistry, Resolver};
///
/// let registry = ServiceRegistry::new();
/// match registry.resolve("missing") {
///     Err(DiError::NotFound(name)) => assert_eq!(name, "missing"),
///     _ => unreachable!(),
/// }
///
/// let circular = DiError::Circular(vec!["a".into(), "b".into(), "a".into()]);
/// assert_eq!(circular.to_string(), "Cyclic service dependency detected: a -> b -> a");
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// Service, alias or scope name is empty or whitespace
    #[error("Service name must be a non-empty string (got {0:?})")]
    InvalidName(String),
    /// Registration argument rejected (self dependency, alias equal to name, ...)
    #[error("Invalid registration: {0}")]
    InvalidArgument(String),
    /// Service already registered and `replace` was not requested
    #[error("Service '{0}' already registered")]
    AlreadyRegistered(String),
    /// Alias collides with another service or alias
    #[error("Alias conflict: {0}")]
    AliasConflict(String),
    /// Resilience policy parameters out of range
    #[error("Invalid resilience policy: {0}")]
    InvalidPolicy(String),
    /// Contract declared without any accepted type
    #[error("Contract for service '{0}' must accept at least one type")]
    InvalidContract(String),
    /// Service not registered
    #[error("Service '{0}' is not registered")]
    NotFound(String),
    /// Circular dependency detected (includes the full chain)
    #[error("Cyclic service dependency detected: {}", .0.join(" -> "))]
    Circular(Vec<String>),
    /// Maximum dependency depth exceeded
    #[error("Max resolution depth {0} exceeded")]
    DepthExceeded(usize),
    /// Factory failed and resilience was exhausted without a fallback
    #[error("Service '{service}' failed: {failure}")]
    Factory {
        service: String,
        #[source]
        failure: ServiceFailure,
    },
    /// The fallback itself failed
    #[error("Fallback for service '{service}' failed: {failure}")]
    Fallback {
        service: String,
        #[source]
        failure: ServiceFailure,
    },
    /// Created instance does not satisfy the declared contract
    #[error("Service '{service}' returned {actual} which does not satisfy contract {expected}")]
    ContractViolation {
        service: String,
        expected: String,
        actual: String,
    },
    /// Validator rejected the created instance
    #[error("Validation of service '{service}' failed: {failure}")]
    Validation {
        service: String,
        #[source]
        failure: ServiceFailure,
    },
    /// Resolved instance could not be downcast to the requested type
    #[error("Service '{service}' is not of type {expected}")]
    TypeMismatch {
        service: String,
        expected: &'static str,
    },
    /// Registry has been shut down
    #[error("ServiceRegistry has been shut down")]
    RegistryShutdown,
    /// Scope has been closed
    #[error("Scope '{0}' has been closed")]
    ScopeClosed(String),
    /// Scope already holds an instance under this name
    #[error("Scope '{scope}' already contains '{name}'")]
    DuplicateInstance { scope: String, name: String },
    /// Scope holds no instance under this name
    #[error("Scope '{scope}' does not contain '{name}'")]
    InstanceNotFound { scope: String, name: String },
    /// Module declared dependencies that are not installed
    #[error("Module '{module}' has unmet dependencies: {}", .missing.join(", "))]
    ModuleDependencies { module: String, missing: Vec<String> },
    /// Module installed twice without `replace`
    #[error("Module '{0}' is already installed")]
    ModuleAlreadyInstalled(String),
    /// Module `configure` callback failed
    #[error("Module '{module}' failed during installation: {source}")]
    ModuleInstall {
        module: String,
        #[source]
        source: Box<DiError>,
    },
    /// Observer registered twice
    #[error("Observer already registered")]
    ObserverAlreadyRegistered,
    /// Observer was never registered
    #[error("Observer not registered")]
    ObserverNotRegistered,
    /// Configuration source could not be read
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiError {
    /// Returns true for errors raised synchronously at registration time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DiError::InvalidName(_)
                | DiError::InvalidArgument(_)
                | DiError::AlreadyRegistered(_)
                | DiError::AliasConflict(_)
                | DiError::InvalidPolicy(_)
                | DiError::InvalidContract(_)
                | DiError::ModuleDependencies { .. }
                | DiError::ModuleAlreadyInstalled(_)
                | DiError::Config(_)
        )
    }

    /// Returns true for errors caused by a shut-down registry or closed scope.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, DiError::RegistryShutdown | DiError::ScopeClosed(_))
    }

    /// The factory failure carried by this error, if any.
    pub fn failure(&self) -> Option<&ServiceFailure> {
        match self {
            DiError::Factory { failure, .. }
            | DiError::Fallback { failure, .. }
            | DiError::Validation { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Result type for registry operations
///
/// ```rust
/// use ferrous_registry::{DiResult, DiError};
///
/// fn lookup() -> DiResult<()> {
///     Err(DiError::NotFound("cache".into()))
/// }
/// assert!(lookup().is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;

/// Category of a [`ServiceFailure`].
///
/// Resilience policies decide whether to retry by matching on the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureKind {
    /// I/O or OS level failure
    Io,
    /// Operation timed out
    Timeout,
    /// A required resource is temporarily unavailable
    Unavailable,
    /// The service was misconfigured
    Configuration,
    /// A declared dependency failed to resolve
    Dependency,
    /// The factory panicked
    Panic,
    /// Application defined category
    Custom(String),
    /// Anything else
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Io => f.write_str("Io"),
            FailureKind::Timeout => f.write_str("Timeout"),
            FailureKind::Unavailable => f.write_str("Unavailable"),
            FailureKind::Configuration => f.write_str("Configuration"),
            FailureKind::Dependency => f.write_str("Dependency"),
            FailureKind::Panic => f.write_str("Panic"),
            FailureKind::Custom(name) => f.write_str(name),
            FailureKind::Other => f.write_str("Other"),
        }
    }
}

/// Failure reported by a factory, fallback, validator or health check.
///
/// # Examples
///
/// ```rust
/// use ferrous_registry::{FailureKind, ServiceFailure};
///
/// let failure = ServiceFailure::new(FailureKind::Timeout, "database did not answer");
/// assert_eq!(failure.kind(), &FailureKind::Timeout);
/// assert_eq!(failure.to_string(), "Timeout: database did not answer");
/// ```
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ServiceFailure {
    kind: FailureKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceFailure {
    /// Creates a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a failure of kind [`FailureKind::Other`].
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    /// Wraps an arbitrary error, keeping it as the source.
    pub fn from_error<E>(kind: FailureKind, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub(crate) fn panic(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Panic, message)
    }

    pub(crate) fn dependency(dependency: &str, service: &str, error: DiError) -> Self {
        Self {
            kind: FailureKind::Dependency,
            message: format!(
                "Dependency '{}' failed while resolving '{}': {}",
                dependency, service, error
            ),
            source: Some(Box::new(error)),
        }
    }

    /// The registry error this failure wraps, if it came from a nested resolution.
    pub fn registry_error(&self) -> Option<&DiError> {
        self.source.as_ref().and_then(|source| source.downcast_ref::<DiError>())
    }

    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lets factories propagate nested resolution errors with `?`.
impl From<DiError> for ServiceFailure {
    fn from(error: DiError) -> Self {
        Self::from_error(FailureKind::Dependency, error)
    }
}

impl From<std::io::Error> for ServiceFailure {
    fn from(error: std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::TimedOut => FailureKind::Timeout,
            _ => FailureKind::Io,
        };
        Self::from_error(kind, error)
    }
}
