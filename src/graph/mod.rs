//! Dependency tracking between registered services.
//!
//! # Data Flow
//! ```text
//! register(config)   → set_dependencies(key, deps)
//! unregister(key)    → remove_service(key)
//! status transition  → dependents_of(key) → dependency:* events
//! admin queries      → dependency_tree(key), detect_cycles()
//! ```

pub mod dependency;

pub use dependency::{DependencyGraph, DependencyNode, MAX_TREE_DEPTH};
