//! Circular dependency detection infrastructure.
//!
//! Every resolution carries the chain of service names currently being
//! resolved on its call stack. A name reappearing in its own chain is a cycle.

use crate::error::{DiError, DiResult, ServiceFailure};

/// Longest dependency chain a single resolution may build.
///
/// Every level costs several frames (registry, attempt loop, factory), so the
/// limit is sized to fit a 2 MiB thread stack in unoptimized builds.
pub const MAX_RESOLUTION_DEPTH: usize = 64;

/// Returns `chain + name`, or the cycle / depth error if `name` cannot be pushed.
pub(crate) fn extend_chain(chain: &[String], name: &str) -> DiResult<Vec<String>> {
    if chain.iter().any(|n| n == name) {
        let mut path = chain.to_vec();
        path.push(name.to_string());
        return Err(DiError::Circular(path));
    }
    if chain.len() >= MAX_RESOLUTION_DEPTH {
        return Err(DiError::DepthExceeded(chain.len()));
    }
    let mut extended = Vec::with_capacity(chain.len() + 1);
    extended.extend_from_slice(chain);
    extended.push(name.to_string());
    Ok(extended)
}

/// Errors that must surface unchanged instead of being retried or wrapped.
pub(crate) fn is_terminal(error: &DiError) -> bool {
    matches!(
        error,
        DiError::Circular(_) | DiError::DepthExceeded(_) | DiError::RegistryShutdown | DiError::ScopeClosed(_)
    )
}

/// Extracts a terminal registry error a factory propagated with `?`.
pub(crate) fn terminal_cause(failure: &ServiceFailure) -> Option<DiError> {
    match failure.registry_error()? {
        DiError::Circular(path) => Some(DiError::Circular(path.clone())),
        DiError::DepthExceeded(depth) => Some(DiError::DepthExceeded(*depth)),
        DiError::RegistryShutdown => Some(DiError::RegistryShutdown),
        DiError::ScopeClosed(scope) => Some(DiError::ScopeClosed(scope.clone())),
        _ => None,
    }
}
