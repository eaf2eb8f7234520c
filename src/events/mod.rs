//! Lifecycle events and their delivery to external collaborators.
//!
//! # Data Flow
//! ```text
//! ServiceRegistry state transition
//!     → bus.rs (EventBus::publish, one queue per subscriber)
//!     → dispatch.rs (alert / remediation dispatcher tasks)
//!         → alert.rs / remediation.rs (map event → payload)
//!         → sink.rs (log or webhook delivery)
//! ```
//!
//! # Design Decisions
//! - One event per state transition; unchanged status emits nothing
//! - Publishing never blocks the scheduler (unbounded per-subscriber queues)
//! - Each event carries a UUID so consumers can discard redeliveries

pub mod alert;
pub mod bus;
pub mod dispatch;
pub mod remediation;
pub mod sink;

pub use alert::{Alert, Severity};
pub use bus::{EventBus, EventKind, RegistryEvent};
pub use remediation::{RemediationAction, RemediationTrigger};
pub use sink::{AlertSink, LogSink, RemediationSink, SinkError, WebhookSink};
