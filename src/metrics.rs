//! Per-service runtime counters.
//!
//! The registry keeps one [`ServiceRuntimeMetrics`] per registered service and
//! updates it on every resolution attempt. Copies are handed out by
//! [`ServiceRegistry::service_metrics`](crate::ServiceRegistry::service_metrics).

use std::time::{Duration, SystemTime};

use crate::error::ServiceFailure;

/// Counters and timings for one service.
///
/// Reset when the service is replaced or unregistered.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceRuntimeMetrics {
    /// Successful creations (cache hits are not counted)
    pub created: u64,
    /// Terminal failures, contract violations included
    pub failures: u64,
    /// Failed attempts that were retried
    pub retries: u64,
    pub fallback_uses: u64,
    pub contract_violations: u64,
    pub last_error: Option<String>,
    pub last_duration: Option<Duration>,
    pub total_duration: Duration,
    pub last_created: Option<SystemTime>,
    pub last_attempts: u32,
    pub last_recovered: bool,
}

impl ServiceRuntimeMetrics {
    pub(crate) fn record_success(&mut self, duration: Duration, attempts: u32, recovered: bool) {
        self.created += 1;
        self.last_duration = Some(duration);
        self.total_duration += duration;
        self.last_created = Some(SystemTime::now());
        self.last_error = None;
        self.last_attempts = attempts;
        self.last_recovered = recovered;
    }

    pub(crate) fn record_failure(&mut self, message: String, attempts: u32) {
        self.failures += 1;
        self.last_error = Some(message);
        self.last_duration = None;
        self.last_attempts = attempts;
        self.last_recovered = false;
    }

    pub(crate) fn record_retry(&mut self, failure: &ServiceFailure, attempts: u32, duration: Duration) {
        self.retries += 1;
        self.last_error = Some(failure.to_string());
        self.last_duration = Some(duration);
        self.last_attempts = attempts;
        self.last_recovered = false;
    }

    pub(crate) fn record_fallback(&mut self) {
        self.fallback_uses += 1;
    }

    pub(crate) fn record_contract_violation(&mut self, message: String, attempts: u32) {
        self.contract_violations += 1;
        self.record_failure(message, attempts);
    }

    /// Mean creation time over successful creations.
    pub fn average_duration(&self) -> Option<Duration> {
        if self.created == 0 {
            return None;
        }
        u32::try_from(self.created)
            .ok()
            .map(|created| self.total_duration / created)
    }
}
