//! Health probe results and per-service health status.

use std::time::{Duration, SystemTime};

/// What a health check reports.
///
/// Health checks return `Result<O, ServiceFailure>` where `O: Into<HealthOutcome>`,
/// so plain values convert directly:
///
/// ```rust
/// use ferrous_registry::{HealthCheckResult, HealthOutcome};
/// use std::time::Duration;
///
/// assert!(HealthCheckResult::from(HealthOutcome::from(())).healthy);
/// assert!(!HealthCheckResult::from(HealthOutcome::from(false)).healthy);
///
/// let described = HealthCheckResult::from(HealthOutcome::from("warm cache"));
/// assert!(described.healthy);
/// assert_eq!(described.details.as_deref(), Some("warm cache"));
///
/// let report = HealthCheckResult::from(HealthOutcome::from((false, "lagging".to_string(), Duration::from_millis(3))));
/// assert!(!report.healthy);
/// assert_eq!(report.duration, Some(Duration::from_millis(3)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum HealthOutcome {
    Healthy,
    Unhealthy,
    /// Healthy, with a description. An empty string carries no details.
    Details(String),
    /// Full report. A `duration` replaces the measured check time.
    Report {
        healthy: bool,
        details: Option<String>,
        duration: Option<Duration>,
    },
}

impl HealthOutcome {
    /// Unhealthy with a description.
    pub fn failing(details: impl Into<String>) -> Self {
        HealthOutcome::Report {
            healthy: false,
            details: Some(details.into()),
            duration: None,
        }
    }
}

impl From<()> for HealthOutcome {
    fn from(_: ()) -> Self {
        HealthOutcome::Healthy
    }
}

impl From<bool> for HealthOutcome {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthOutcome::Healthy
        } else {
            HealthOutcome::Unhealthy
        }
    }
}

impl From<&str> for HealthOutcome {
    fn from(details: &str) -> Self {
        HealthOutcome::Details(details.to_string())
    }
}

impl From<String> for HealthOutcome {
    fn from(details: String) -> Self {
        HealthOutcome::Details(details)
    }
}

impl From<(bool, String)> for HealthOutcome {
    fn from((healthy, details): (bool, String)) -> Self {
        HealthOutcome::Report {
            healthy,
            details: Some(details),
            duration: None,
        }
    }
}

impl From<(bool, String, Duration)> for HealthOutcome {
    fn from((healthy, details, duration): (bool, String, Duration)) -> Self {
        HealthOutcome::Report {
            healthy,
            details: Some(details),
            duration: Some(duration),
        }
    }
}

impl From<HealthCheckResult> for HealthOutcome {
    fn from(result: HealthCheckResult) -> Self {
        HealthOutcome::Report {
            healthy: result.healthy,
            details: result.details,
            duration: result.duration,
        }
    }
}

/// Uniform `{healthy, details, duration}` shape of a [`HealthOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub details: Option<String>,
    pub duration: Option<Duration>,
}

impl From<HealthOutcome> for HealthCheckResult {
    fn from(outcome: HealthOutcome) -> Self {
        let (healthy, details, duration) = match outcome {
            HealthOutcome::Healthy => (true, None, None),
            HealthOutcome::Unhealthy => (false, None, None),
            HealthOutcome::Details(details) => (true, Some(details), None),
            HealthOutcome::Report {
                healthy,
                details,
                duration,
            } => (healthy, details, duration),
        };
        HealthCheckResult {
            healthy,
            details: details.filter(|d| !d.is_empty()),
            duration,
        }
    }
}

/// Which step produced a [`ServiceHealthStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HealthSource {
    /// The registry itself (shut down)
    Registry,
    /// Resolution only; no health check attached or resolution failed
    Resolution,
    /// The service's health check
    HealthCheck,
    /// `health_snapshot` caught an error outside resolution
    Snapshot,
}

/// Health of one service at a point in time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceHealthStatus {
    pub name: String,
    pub healthy: bool,
    pub critical: bool,
    pub details: Option<String>,
    /// Whether a health check ran
    pub checked: bool,
    pub timestamp: SystemTime,
    pub resolve_duration: Option<Duration>,
    pub check_duration: Option<Duration>,
    pub source: HealthSource,
}

impl ServiceHealthStatus {
    pub(crate) fn unhealthy(
        name: impl Into<String>,
        critical: bool,
        details: String,
        resolve_duration: Option<Duration>,
        source: HealthSource,
    ) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            critical,
            details: Some(details),
            checked: false,
            timestamp: SystemTime::now(),
            resolve_duration,
            check_duration: None,
            source,
        }
    }

    /// Healthy, or not critical.
    pub fn is_acceptable(&self) -> bool {
        self.healthy || !self.critical
    }
}
