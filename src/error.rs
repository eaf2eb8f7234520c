//! Registry error types.

use thiserror::Error;

use crate::registry::key::ServiceKey;

/// Errors surfaced to callers of the registry API.
///
/// Probe failures are not errors at this level; they are folded into the
/// service's counters by the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    /// The registration request failed validation.
    #[error("invalid service registration: {}", .0.join("; "))]
    Registration(Vec<String>),

    /// No service is registered under this key.
    #[error("service not found: {0}")]
    NotFound(ServiceKey),

    /// A probe for this service is already running.
    #[error("health check already in progress for {0}")]
    ProbeInFlight(ServiceKey),
}

/// Result type for registry operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
