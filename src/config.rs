//! Registry configuration.
//!
//! [`RegistryConfig`] can be built in code, read from `FERROUS_REGISTRY_*`
//! environment variables, or (with the `config` feature) parsed from JSON.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DiError, DiResult, FailureKind};
use crate::resilience::ResiliencePolicy;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENV_PREFIX: &str = "FERROUS_REGISTRY";

/// Settings applied by [`ServiceRegistry::with_config`](crate::ServiceRegistry::with_config).
///
/// ```rust
/// use ferrous_registry::{RegistryConfig, ResilienceConfig, ServiceRegistry};
///
/// let config = RegistryConfig {
///     history_capacity: 16,
///     default_resilience: Some(ResilienceConfig { max_attempts: 3, ..Default::default() }),
///     ..Default::default()
/// };
/// let registry = ServiceRegistry::with_config(config).unwrap();
/// assert_eq!(registry.default_resilience_policy().unwrap().max_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct RegistryConfig {
    /// Events kept in the resolution history ring
    pub history_capacity: usize,
    /// Creations at least this slow are reported by `InsightsObserver`
    pub slow_resolution_threshold_ms: u64,
    /// Policy attached to services registered without one
    pub default_resilience: Option<ResilienceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 256,
            slow_resolution_threshold_ms: 250,
            default_resilience: None,
        }
    }
}

/// Serializable subset of [`ResiliencePolicy`] (fallbacks are code, not config).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    /// Failure kinds to retry; empty retries everything
    pub retry_on: Vec<FailureKind>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            backoff_factor: 1.0,
            retry_on: Vec::new(),
        }
    }
}

impl ResilienceConfig {
    pub fn to_policy(&self) -> DiResult<ResiliencePolicy> {
        ResiliencePolicy::builder()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .backoff_factor(self.backoff_factor)
            .retry_on(self.retry_on.iter().cloned())
            .build()
    }
}

impl RegistryConfig {
    pub fn slow_resolution_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_resolution_threshold_ms)
    }

    /// Reads `FERROUS_REGISTRY_*` variables over the defaults.
    pub fn from_env() -> DiResult<Self> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Reads `<PREFIX>_HISTORY_CAPACITY`, `<PREFIX>_SLOW_THRESHOLD_MS`,
    /// `<PREFIX>_MAX_ATTEMPTS`, `<PREFIX>_INITIAL_DELAY_MS` and
    /// `<PREFIX>_BACKOFF_FACTOR`. Any resilience variable enables a default
    /// policy.
    pub fn from_env_with_prefix(prefix: &str) -> DiResult<Self> {
        let source = EnvSource::new(prefix);
        let mut config = Self::default();
        if let Some(capacity) = source.parse("HISTORY_CAPACITY")? {
            config.history_capacity = capacity;
        }
        if let Some(threshold) = source.parse("SLOW_THRESHOLD_MS")? {
            config.slow_resolution_threshold_ms = threshold;
        }

        let max_attempts = source.parse::<u32>("MAX_ATTEMPTS")?;
        let initial_delay_ms = source.parse::<u64>("INITIAL_DELAY_MS")?;
        let backoff_factor = source.parse::<f64>("BACKOFF_FACTOR")?;
        if max_attempts.is_some() || initial_delay_ms.is_some() || backoff_factor.is_some() {
            let defaults = ResilienceConfig::default();
            config.default_resilience = Some(ResilienceConfig {
                max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
                initial_delay_ms: initial_delay_ms.unwrap_or(defaults.initial_delay_ms),
                backoff_factor: backoff_factor.unwrap_or(defaults.backoff_factor),
                retry_on: Vec::new(),
            });
        }
        Ok(config)
    }

    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::Config(format!("invalid registry config: {}", e)))
    }

    #[cfg(feature = "config")]
    pub fn to_json(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DiError::Config(e.to_string()))
    }

    pub(crate) fn default_policy(&self) -> DiResult<Option<ResiliencePolicy>> {
        self.default_resilience.as_ref().map(ResilienceConfig::to_policy).transpose()
    }
}

/// Environment variables under a common prefix.
struct EnvSource {
    prefix: String,
}

impl EnvSource {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('_').to_uppercase(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    fn parse<T>(&self, name: &str) -> DiResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let key = self.key(name);
        match env::var(&key) {
            Ok(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| DiError::Config(format!("{}={:?}: {}", key, raw, e))),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(DiError::Config(format!("{}: {}", key, e))),
        }
    }
}
