//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! register_service(config)
//!     → record.rs (validate, build ServiceRecord + CircuitBreaker)
//!     → store.rs (insert, index under logical name)
//!     → graph (replace dependency edges)
//!     → events (service:registered)
//!
//! Scheduler cycle:
//!     → service_registry.rs (acquire_probe / apply_probe_result)
//!     → overview.rs (aggregate snapshot after the cycle)
//! ```
//!
//! # Design Decisions
//! - Keys are `name:instance`; a bare name means the `default` instance
//! - Status is derived from probe outcomes only, never set by callers
//! - Records are never removed implicitly; silence makes them stale

pub mod key;
pub mod overview;
pub mod record;
pub mod service_registry;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

pub use key::{InvalidServiceKey, ServiceKey, DEFAULT_INSTANCE};
pub use overview::HealthOverview;
pub use record::{HealthCheckSpec, HealthCounters, Protocol, ServiceConfig, ServiceRecord, ServiceStatus};
pub use service_registry::{ProbeSkip, ProbeTicket, ServiceRegistry};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
