//! Service dependency graph.
//!
//! # Responsibilities
//! - Store declared dependency edges (`service → dependency`)
//! - Maintain the reverse index (`dependency → dependents`)
//! - Expand a service into its dependency tree
//! - Find dependency cycles
//!
//! # Design Decisions
//! - Ordered maps so traversal order (and therefore output) is deterministic
//! - Edges to unregistered services are kept as placeholder nodes
//! - Traversals carry the current path, so cycles end the branch instead of
//!   recursing; depth is bounded by the node count and by `MAX_TREE_DEPTH`

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::registry::key::ServiceKey;
use crate::registry::record::ServiceStatus;

/// Maximum expansion depth of a dependency tree.
pub const MAX_TREE_DEPTH: usize = 64;

/// One node of an expanded dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyNode {
    pub service: ServiceKey,
    /// Current status, `None` for placeholders.
    pub status: Option<ServiceStatus>,
    pub registered: bool,
    /// The key already appears on the path from the root.
    pub circular: bool,
    /// Expansion stopped at `MAX_TREE_DEPTH`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    pub dependencies: Vec<DependencyNode>,
}

/// Adjacency-list graph keyed by service key.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<ServiceKey, BTreeSet<ServiceKey>>,
    dependents: BTreeMap<ServiceKey, BTreeSet<ServiceKey>>,
    declared: BTreeSet<ServiceKey>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the declared dependencies of `service`.
    pub fn set_dependencies(&mut self, service: ServiceKey, dependencies: BTreeSet<ServiceKey>) {
        self.detach(&service);

        for dep in &dependencies {
            self.edges.entry(dep.clone()).or_default();
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(service.clone());
        }

        self.declared.insert(service.clone());
        self.edges.insert(service, dependencies);
    }

    /// Drop a service's own edges. The node stays as a placeholder while
    /// other services still depend on it.
    pub fn remove_service(&mut self, service: &ServiceKey) {
        self.detach(service);
        self.declared.remove(service);
        self.edges.remove(service);
        self.prune_placeholder(service);
    }

    pub fn contains(&self, service: &ServiceKey) -> bool {
        self.edges.contains_key(service)
    }

    /// Node referenced by an edge but never registered.
    pub fn is_placeholder(&self, service: &ServiceKey) -> bool {
        self.contains(service) && !self.declared.contains(service)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn dependencies_of(&self, service: &ServiceKey) -> BTreeSet<ServiceKey> {
        self.edges.get(service).cloned().unwrap_or_default()
    }

    /// Services that declared `service` as a dependency.
    pub fn dependents_of(&self, service: &ServiceKey) -> BTreeSet<ServiceKey> {
        self.dependents.get(service).cloned().unwrap_or_default()
    }

    /// Expand `root` into its dependency tree.
    ///
    /// `status_of` supplies the live status of registered services.
    pub fn dependency_tree<F>(&self, root: &ServiceKey, status_of: F) -> Option<DependencyNode>
    where
        F: Fn(&ServiceKey) -> Option<ServiceStatus>,
    {
        if !self.contains(root) {
            return None;
        }
        let mut path = BTreeSet::new();
        Some(self.expand(root, &status_of, &mut path, 0))
    }

    fn expand<F>(
        &self,
        service: &ServiceKey,
        status_of: &F,
        path: &mut BTreeSet<ServiceKey>,
        depth: usize,
    ) -> DependencyNode
    where
        F: Fn(&ServiceKey) -> Option<ServiceStatus>,
    {
        let status = status_of(service);
        let mut node = DependencyNode {
            service: service.clone(),
            status,
            registered: status.is_some(),
            circular: false,
            truncated: false,
            dependencies: Vec::new(),
        };

        if path.contains(service) {
            node.circular = true;
            return node;
        }
        if depth >= MAX_TREE_DEPTH {
            node.truncated = true;
            return node;
        }

        path.insert(service.clone());
        if let Some(deps) = self.edges.get(service) {
            for dep in deps {
                let child = self.expand(dep, status_of, path, depth + 1);
                node.dependencies.push(child);
            }
        }
        path.remove(service);

        node
    }

    /// Every cycle found by a depth-first scan.
    ///
    /// Each cycle is returned as a closed path (`[a, b, a]`). Nodes are
    /// visited in key order, so the result is stable for a given graph.
    pub fn detect_cycles(&self) -> Vec<Vec<ServiceKey>> {
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut path = Vec::new();
        let mut cycles = Vec::new();

        for node in self.edges.keys() {
            if !visited.contains(node) {
                self.dfs_cycles(node, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn dfs_cycles(
        &self,
        node: &ServiceKey,
        visited: &mut BTreeSet<ServiceKey>,
        on_stack: &mut BTreeSet<ServiceKey>,
        path: &mut Vec<ServiceKey>,
        cycles: &mut Vec<Vec<ServiceKey>>,
    ) {
        visited.insert(node.clone());
        on_stack.insert(node.clone());
        path.push(node.clone());

        if let Some(neighbors) = self.edges.get(node) {
            for neighbor in neighbors {
                if !visited.contains(neighbor) {
                    self.dfs_cycles(neighbor, visited, on_stack, path, cycles);
                } else if on_stack.contains(neighbor) {
                    if let Some(start) = path.iter().position(|k| k == neighbor) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(neighbor.clone());
                        cycles.push(cycle);
                    }
                }
            }
        }

        path.pop();
        on_stack.remove(node);
    }

    fn detach(&mut self, service: &ServiceKey) {
        let previous = match self.edges.get_mut(service) {
            Some(deps) => std::mem::take(deps),
            None => return,
        };

        for dep in previous {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(service);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
            self.prune_placeholder(&dep);
        }
    }

    fn prune_placeholder(&mut self, service: &ServiceKey) {
        let orphan = !self.declared.contains(service) && !self.dependents.contains_key(service);
        if orphan {
            self.edges.remove(service);
        } else if !self.declared.contains(service) {
            self.edges.entry(service.clone()).or_default();
        }
    }
}
