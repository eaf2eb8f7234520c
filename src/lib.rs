//! Service discovery and health monitoring library.

pub mod admin;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use config::schema::DiscoveryConfig;
pub use error::{DiscoveryError, DiscoveryResult};
pub use health::scheduler::HealthScheduler;
pub use lifecycle::Shutdown;
pub use registry::{ServiceKey, ServiceRegistry};
