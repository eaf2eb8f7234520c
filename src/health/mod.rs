//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (periodic ticker or forced check)
//!     → ServiceRegistry::acquire_probe (breaker + in-flight guard)
//!     → probe.rs (one bounded HTTP round trip)
//!         → expectation.rs (partial JSON body match)
//!     → ServiceRegistry::apply_probe_result (counters, status, events)
//! ```
//!
//! # Design Decisions
//! - Probing and state mutation are separate; probes are pure I/O
//! - State transitions require consecutive successes/failures
//! - Health state is per service instance

pub mod expectation;
pub mod probe;
pub mod scheduler;

pub use expectation::{BodyExpectation, BodyMismatch};
pub use probe::{HealthProbe, HttpProbe, ProbeError, ProbeOutcome, ProbeTarget};
pub use scheduler::{CycleReport, HealthScheduler};
