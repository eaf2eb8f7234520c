//! Service record storage.
//!
//! # Responsibilities
//! - Own the canonical map of service records
//! - Index instances by logical service name
//! - Apply updates to one record atomically
//!
//! # Design Decisions
//! - `DashMap` sharded locking: readers of one key never see a half-applied
//!   update because mutations run under the entry's write lock
//! - Queries return owned snapshots, never references into the map

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;

use crate::registry::key::ServiceKey;
use crate::registry::record::{ServiceRecord, ServiceStatus};

#[derive(Debug, Default)]
pub struct ServiceStore {
    records: DashMap<ServiceKey, ServiceRecord>,
    /// name → instances
    groups: DashMap<String, BTreeSet<String>>,
}

impl ServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the replaced record.
    pub fn insert(&self, record: ServiceRecord) -> Option<ServiceRecord> {
        let key = record.key.clone();
        self.groups
            .entry(key.name().to_string())
            .or_default()
            .insert(key.instance().to_string());
        self.records.insert(key, record)
    }

    pub fn remove(&self, key: &ServiceKey) -> Option<ServiceRecord> {
        let (_, record) = self.records.remove(key)?;
        self.groups.remove_if_mut(key.name(), |_, instances| {
            instances.remove(key.instance());
            instances.is_empty()
        });
        Some(record)
    }

    pub fn get(&self, key: &ServiceKey) -> Option<ServiceRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn status_of(&self, key: &ServiceKey) -> Option<ServiceStatus> {
        self.records.get(key).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// All records, sorted by key.
    pub fn list_all(&self) -> Vec<ServiceRecord> {
        self.collect(|_| true)
    }

    pub fn list_by_status(&self, status: ServiceStatus) -> Vec<ServiceRecord> {
        self.collect(|r| r.status == status)
    }

    /// Every instance registered under a logical name.
    pub fn instances_of(&self, name: &str) -> Vec<ServiceRecord> {
        let instances = match self.groups.get(name) {
            Some(group) => group.value().clone(),
            None => return Vec::new(),
        };
        instances
            .into_iter()
            .filter_map(|instance| self.get(&ServiceKey::new(name, instance)))
            .collect()
    }

    /// Run `f` against one record under its write lock.
    pub fn update<F, R>(&self, key: &ServiceKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut ServiceRecord) -> R,
    {
        self.records.get_mut(key).map(|mut r| f(r.value_mut()))
    }

    /// Mark healthy/unknown records not seen within `ttl_ms` as stale.
    ///
    /// Returns the affected keys with their `last_seen`.
    pub fn mark_stale_if_silent(&self, now: u64, ttl_ms: u64) -> Vec<(ServiceKey, u64)> {
        let mut marked = Vec::new();
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            let silent = now.saturating_sub(record.last_seen) > ttl_ms;
            let eligible = matches!(record.status, ServiceStatus::Healthy | ServiceStatus::Unknown);
            if silent && eligible {
                record.status = ServiceStatus::Stale;
                marked.push((record.key.clone(), record.last_seen));
            }
        }
        marked.sort();
        marked
    }

    fn collect<P>(&self, predicate: P) -> Vec<ServiceRecord>
    where
        P: Fn(&ServiceRecord) -> bool,
    {
        let sorted: BTreeMap<ServiceKey, ServiceRecord> = self
            .records
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        sorted.into_values().collect()
    }
}
