//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Health probe:
//!     → circuit_breaker.rs (gate the probe, record the outcome)
//!
//! Webhook delivery:
//!     → On failure: backoff.rs (jittered exponential delay before retry)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Circuit breaker stops wasted probes against a service that keeps failing
//! - Retries are bounded; a delivery that exhausts them is logged and dropped

pub mod backoff;
pub mod circuit_breaker;

pub use circuit_breaker::{BreakerPolicy, BreakerState, CircuitBreaker, Permit, Transition};
