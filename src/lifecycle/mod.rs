//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Subscribe dispatchers → Register services → Start scheduler
//!
//! Reload (startup.rs):
//!     Watcher sends new config → reconcile_services
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop ticker, reload and admin → Finish in-flight cycle
//!         → Stop dispatchers → Drain queues → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has timeout: remaining tasks are abandoned after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{stop_in_order, Shutdown, Task};
