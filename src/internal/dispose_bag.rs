//! Shutdown callbacks captured for cached instances.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptors::CloseFn;
use crate::internal::guard;
use crate::registration::AnyArc;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A shutdown callback bound to the instance it disposes.
///
/// Hooks remember the order in which they were captured so that owners can
/// run them in reverse (LIFO), the most recently created instance first.
pub(crate) struct ShutdownHook {
    callback: CloseFn,
    instance: AnyArc,
    sequence: u64,
}

impl ShutdownHook {
    pub(crate) fn new(callback: CloseFn, instance: AnyArc) -> Self {
        Self {
            callback,
            instance,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Runs the callback; a panic is logged, never propagated.
    pub(crate) fn invoke(self, service: &str) {
        let ShutdownHook { callback, instance, .. } = self;
        if let Err(message) = guard::catch(|| callback(&instance)) {
            tracing::error!(service = %service, panic = %message, "shutdown callback failed");
        }
    }
}

/// Runs hooks newest-first.
pub(crate) fn run_hooks(mut hooks: Vec<(String, ShutdownHook)>) {
    hooks.sort_by(|a, b| b.1.sequence.cmp(&a.1.sequence));
    for (service, hook) in hooks {
        hook.invoke(&service);
    }
}
