//! Retry, backoff and fallback policies for service factories.
//!
//! A [`ResiliencePolicy`] is attached to a service at registration time (or
//! installed as the registry-wide default). When the factory fails, the policy
//! decides whether the failure is retryable, how long to back off before the
//! next attempt, and what to fall back to once attempts are exhausted.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DiError, DiResult, FailureKind, ServiceFailure};
use crate::provider::ResolverContext;
use crate::registration::AnyArc;

pub(crate) type FallbackFn =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>, &ServiceFailure) -> Result<AnyArc, ServiceFailure> + Send + Sync>;

/// Which failures a policy retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOn {
    /// Retry every failure kind
    Any,
    /// Retry only the listed kinds (never empty; see [`RetryOn::kinds`])
    Kinds(BTreeSet<FailureKind>),
}

impl RetryOn {
    /// Builds a kind set; an empty set means "retry any failure".
    pub fn kinds<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = FailureKind>,
    {
        let set: BTreeSet<FailureKind> = kinds.into_iter().collect();
        if set.is_empty() {
            RetryOn::Any
        } else {
            RetryOn::Kinds(set)
        }
    }

    pub fn matches(&self, kind: &FailureKind) -> bool {
        match self {
            RetryOn::Any => true,
            RetryOn::Kinds(kinds) => kinds.contains(kind),
        }
    }
}

/// Immutable retry/backoff/fallback configuration.
///
/// Construct it with [`ResiliencePolicy::builder`]; invalid parameters are
/// rejected by [`ResiliencePolicyBuilder::build`].
///
/// # Examples
///
/// ```rust
/// use ferrous_registry::{FailureKind, ResiliencePolicy};
/// use std::time::Duration;
///
/// let policy = ResiliencePolicy::builder()
///     .max_attempts(3)
///     .initial_delay(Duration::from_millis(10))
///     .backoff_factor(2.0)
///     .retry_on([FailureKind::Timeout])
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.compute_delay(1), Duration::from_millis(10));
/// assert_eq!(policy.compute_delay(2), Duration::from_millis(20));
/// assert_eq!(policy.compute_delay(3), Duration::from_millis(40));
/// ```
#[derive(Clone)]
pub struct ResiliencePolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    retry_on: RetryOn,
    fallback: Option<FallbackFn>,
}

impl ResiliencePolicy {
    pub fn builder() -> ResiliencePolicyBuilder {
        ResiliencePolicyBuilder::default()
    }

    /// A policy that retries any failure up to `max_attempts` times with no delay.
    pub fn retry(max_attempts: u32) -> DiResult<Self> {
        Self::builder().max_attempts(max_attempts).build()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn retry_on(&self) -> &RetryOn {
        &self.retry_on
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub(crate) fn fallback(&self) -> Option<&FallbackFn> {
        self.fallback.as_ref()
    }

    /// Whether `failure` on the 1-based `attempt` should be retried.
    pub fn should_retry(&self, failure: &ServiceFailure, attempt: u32) -> bool {
        attempt < self.max_attempts && self.retry_on.matches(failure.kind())
    }

    /// Delay to wait after the 1-based `attempt` failed.
    ///
    /// `initial_delay × backoff_factor^(attempt-1)`, zero when the initial
    /// delay is zero. Saturates at `Duration::MAX`.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Serializable description used by diagnostics.
    pub fn describe(&self) -> PolicySummary {
        let retry_on = match &self.retry_on {
            RetryOn::Any => vec!["Any".to_string()],
            RetryOn::Kinds(kinds) => kinds.iter().map(|k| k.to_string()).collect(),
        };
        PolicySummary {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            backoff_factor: self.backoff_factor,
            retry_on,
            has_fallback: self.fallback.is_some(),
        }
    }
}

impl fmt::Debug for ResiliencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("retry_on", &self.retry_on)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            retry_on: RetryOn::Any,
            fallback: None,
        }
    }
}

/// Snapshot of a policy for diagnostics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PolicySummary {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub retry_on: Vec<String>,
    pub has_fallback: bool,
}

/// Builder for [`ResiliencePolicy`].
#[derive(Default)]
pub struct ResiliencePolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    backoff_factor: Option<f64>,
    retry_on: Vec<FailureKind>,
    fallback: Option<FallbackFn>,
}

impl ResiliencePolicyBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Restricts retries to these kinds. Calling it with nothing keeps "retry any".
    pub fn retry_on<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = FailureKind>,
    {
        self.retry_on.extend(kinds);
        self
    }

    /// Typed fallback invoked with the last failure once attempts are exhausted.
    pub fn fallback<T, F>(self, fallback: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>, &ServiceFailure) -> Result<T, ServiceFailure> + Send + Sync + 'static,
    {
        self.fallback_any(move |ctx, failure| fallback(ctx, failure).map(|value| Arc::new(value) as AnyArc))
    }

    /// Fallback producing an already type-erased value.
    pub fn fallback_any<F>(mut self, fallback: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>, &ServiceFailure) -> Result<AnyArc, ServiceFailure> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn build(self) -> DiResult<ResiliencePolicy> {
        let max_attempts = self.max_attempts.unwrap_or(1);
        if max_attempts < 1 {
            return Err(DiError::InvalidPolicy("max_attempts must be at least 1".into()));
        }
        let backoff_factor = self.backoff_factor.unwrap_or(1.0);
        if !backoff_factor.is_finite() || backoff_factor < 0.0 {
            return Err(DiError::InvalidPolicy(format!(
                "backoff_factor must be a non-negative number (got {})",
                backoff_factor
            )));
        }
        Ok(ResiliencePolicy {
            max_attempts,
            initial_delay: self.initial_delay.unwrap_or(Duration::ZERO),
            backoff_factor,
            retry_on: RetryOn::kinds(self.retry_on),
            fallback: self.fallback,
        })
    }
}
