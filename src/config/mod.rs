//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! discovery.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, every service included)
//!     → DiscoveryConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validated config sent on a channel
//!     → daemon reconciles the registered service set
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AdminConfig, DiscoveryConfig, LogFormat, ObservabilityConfig, SchedulerConfig, SinkConfig};
pub use watcher::ConfigWatcher;
