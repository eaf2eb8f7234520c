//! The service registry.
//!
//! # Responsibilities
//! - Register and unregister service instances
//! - Gate probes through the per-service circuit breaker and in-flight guard
//! - Apply probe outcomes to records and emit transition events
//! - Maintain the dependency graph and the health overview snapshot
//!
//! # Design Decisions
//! - One explicit instance owns all state; collaborators hold an `Arc`
//! - Time is passed in as epoch milliseconds on every mutating call that
//!   depends on it, so tests drive the clock
//! - Records are mutated under the store's per-key lock; events are
//!   published after the lock is released
//! - A generation number distinguishes successive registrations of one key,
//!   so a probe started before a re-registration cannot touch the new record
//!
//! # Data Flow
//! ```text
//! acquire_probe(key, now)
//!     → in-flight guard + breaker permit → ProbeTicket
//! HealthProbe::probe(ticket.target)
//! apply_probe_result(ticket, outcome, now)
//!     → counters, status, breaker → events → guard released
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use dashmap::DashSet;
use tokio::sync::mpsc;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::events::bus::{EventBus, EventKind, RegistryEvent};
use crate::graph::{DependencyGraph, DependencyNode};
use crate::health::probe::{ProbeOutcome, ProbeTarget};
use crate::observability::metrics;
use crate::registry::key::ServiceKey;
use crate::registry::now_millis;
use crate::registry::overview::HealthOverview;
use crate::registry::record::{ServiceConfig, ServiceRecord, ServiceStatus};
use crate::registry::store::ServiceStore;
use crate::resilience::circuit_breaker::{BreakerPolicy, BreakerState, Permit, Transition};

/// RAII marker for a probe in progress.
///
/// Removes the key from the in-flight set on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<DashSet<ServiceKey>>,
    key: ServiceKey,
}

impl InFlightGuard {
    fn try_acquire(set: &Arc<DashSet<ServiceKey>>, key: &ServiceKey) -> Option<Self> {
        if set.insert(key.clone()) {
            Some(Self {
                set: set.clone(),
                key: key.clone(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Permission to run one probe.
#[derive(Debug)]
pub struct ProbeTicket {
    pub target: ProbeTarget,
    pub permit: Permit,
    generation: u64,
    _guard: InFlightGuard,
}

/// Why a probe was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSkip {
    NotFound,
    InFlight,
    CircuitOpen { retry_at: u64 },
}

struct Applied {
    previous: ServiceStatus,
    record: ServiceRecord,
    transition: Option<Transition>,
}

/// Registry of service instances and their health state.
pub struct ServiceRegistry {
    store: ServiceStore,
    graph: RwLock<DependencyGraph>,
    in_flight: Arc<DashSet<ServiceKey>>,
    events: EventBus,
    policy: BreakerPolicy,
    overview: ArcSwap<HealthOverview>,
    cycles: AtomicU64,
    last_cycle_at: AtomicU64,
    generation: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            store: ServiceStore::new(),
            graph: RwLock::new(DependencyGraph::new()),
            in_flight: Arc::new(DashSet::new()),
            events: EventBus::new(),
            policy,
            overview: ArcSwap::from_pointee(HealthOverview::default()),
            cycles: AtomicU64::new(0),
            last_cycle_at: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// The event bus transitions are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        self.events.subscribe()
    }

    // --- Registration ---

    pub fn register_service(&self, config: ServiceConfig) -> DiscoveryResult<ServiceRecord> {
        self.register_service_at(config, now_millis())
    }

    /// Register or replace a service instance.
    ///
    /// Re-registering a key starts from scratch: counters, status and the
    /// breaker are reset.
    pub fn register_service_at(
        &self,
        config: ServiceConfig,
        now: u64,
    ) -> DiscoveryResult<ServiceRecord> {
        let dependencies = config.validate().map_err(DiscoveryError::Registration)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let record =
            ServiceRecord::from_config(config, dependencies.clone(), self.policy, now, generation)
                .map_err(|e| DiscoveryError::Registration(vec![e.to_string()]))?;
        let key = record.key.clone();

        if self.store.insert(record.clone()).is_some() {
            tracing::info!(service = %key, "Replacing existing registration");
        }
        self.graph
            .write()
            .expect("dependency graph lock poisoned")
            .set_dependencies(key.clone(), dependencies);

        tracing::info!(service = %key, endpoint = %record.endpoint, "Service registered");
        self.events.publish(EventKind::ServiceRegistered {
            service: key,
            endpoint: record.endpoint.clone(),
        });
        self.refresh_overview(now);

        Ok(record)
    }

    /// Remove a service; `false` if it was not registered.
    pub fn unregister_service(&self, key: &ServiceKey) -> bool {
        if self.store.remove(key).is_none() {
            return false;
        }
        self.graph
            .write()
            .expect("dependency graph lock poisoned")
            .remove_service(key);

        tracing::info!(service = %key, "Service unregistered");
        self.events.publish(EventKind::ServiceUnregistered {
            service: key.clone(),
        });
        self.refresh_overview(now_millis());
        true
    }

    pub fn heartbeat(&self, key: &ServiceKey) -> DiscoveryResult<ServiceRecord> {
        self.heartbeat_at(key, now_millis())
    }

    /// An instance reports itself alive.
    ///
    /// Refreshes `last_seen`; a stale record returns to `unknown` until its
    /// next probe.
    pub fn heartbeat_at(&self, key: &ServiceKey, now: u64) -> DiscoveryResult<ServiceRecord> {
        self.store
            .update(key, |record| {
                record.last_seen = record.last_seen.max(now);
                if record.status == ServiceStatus::Stale {
                    record.status = ServiceStatus::Unknown;
                }
                record.clone()
            })
            .ok_or_else(|| DiscoveryError::NotFound(key.clone()))
    }

    // --- Queries ---

    pub fn get_service(&self, key: &ServiceKey) -> DiscoveryResult<ServiceRecord> {
        self.store
            .get(key)
            .ok_or_else(|| DiscoveryError::NotFound(key.clone()))
    }

    pub fn get_all_services(&self) -> Vec<ServiceRecord> {
        self.store.list_all()
    }

    pub fn get_services_by_status(&self, status: ServiceStatus) -> Vec<ServiceRecord> {
        self.store.list_by_status(status)
    }

    pub fn get_instances(&self, name: &str) -> Vec<ServiceRecord> {
        self.store.instances_of(name)
    }

    pub fn service_keys(&self) -> Vec<ServiceKey> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get_dependency_tree(&self, key: &ServiceKey) -> DiscoveryResult<DependencyNode> {
        if !self.store.contains(key) {
            return Err(DiscoveryError::NotFound(key.clone()));
        }
        self.graph
            .read()
            .expect("dependency graph lock poisoned")
            .dependency_tree(key, |k| self.store.status_of(k))
            .ok_or_else(|| DiscoveryError::NotFound(key.clone()))
    }

    /// Services that declared `key` as a dependency.
    pub fn dependents_of(&self, key: &ServiceKey) -> Vec<ServiceKey> {
        self.graph
            .read()
            .expect("dependency graph lock poisoned")
            .dependents_of(key)
            .into_iter()
            .collect()
    }

    pub fn detect_circular_dependencies(&self) -> Vec<Vec<ServiceKey>> {
        self.graph
            .read()
            .expect("dependency graph lock poisoned")
            .detect_cycles()
    }

    pub fn get_health_overview(&self) -> Arc<HealthOverview> {
        self.overview.load_full()
    }

    /// Whether a probe for `key` is running.
    pub fn is_probe_in_flight(&self, key: &ServiceKey) -> bool {
        self.in_flight.contains(key)
    }

    // --- Probing ---

    /// Reserve a probe for `key` at `now`.
    ///
    /// With `force`, an open breaker moves to half-open without waiting for
    /// its cooldown. The in-flight guard is never bypassed.
    pub fn acquire_probe(
        &self,
        key: &ServiceKey,
        now: u64,
        force: bool,
    ) -> Result<ProbeTicket, ProbeSkip> {
        if !self.store.contains(key) {
            return Err(ProbeSkip::NotFound);
        }
        let guard = InFlightGuard::try_acquire(&self.in_flight, key).ok_or(ProbeSkip::InFlight)?;

        let reserved = self.store.update(key, |record| {
            let was_open = record.circuit_breaker.state() == BreakerState::Open;
            let permit = if force {
                record.circuit_breaker.force_trial()
            } else {
                record.circuit_breaker.try_acquire(now)
            };
            if was_open && permit == Permit::Trial {
                tracing::info!(service = %record.key, "Circuit breaker half-open, sending trial probe");
            }
            match permit {
                Permit::Denied { retry_at } => Err(ProbeSkip::CircuitOpen { retry_at }),
                _ => Ok((ProbeTarget::from_record(record), record.generation, permit)),
            }
        });

        let (target, generation, permit) = reserved.ok_or(ProbeSkip::NotFound)??;
        Ok(ProbeTicket {
            target,
            permit,
            generation,
            _guard: guard,
        })
    }

    /// Fold a probe outcome into the record and emit transition events.
    ///
    /// Returns `None` if the service was unregistered or re-registered while
    /// the probe ran; the outcome is dropped in that case.
    pub fn apply_probe_result(
        &self,
        ticket: ProbeTicket,
        outcome: &ProbeOutcome,
        now: u64,
    ) -> Option<ServiceRecord> {
        let key = ticket.target.key.clone();
        let failure_threshold = self.policy.failure_threshold;

        let applied = self.store.update(&key, |record| {
            if record.generation != ticket.generation {
                return None;
            }
            let previous = record.status;
            record.last_health_check = Some(now);

            let transition = match &outcome.result {
                Ok(_) => {
                    record.metrics.record_success(outcome.elapsed_ms);
                    record.last_seen = record.last_seen.max(now);
                    record.last_error = None;
                    let transition = record.circuit_breaker.record_success(now);
                    if record.circuit_breaker.state() == BreakerState::Closed {
                        record.status = ServiceStatus::Healthy;
                    }
                    transition
                }
                Err(error) => {
                    record.metrics.record_failure(outcome.elapsed_ms);
                    record.last_error = Some(error.to_string());
                    let transition = record.circuit_breaker.record_failure(now);
                    if record.metrics.consecutive_failures >= failure_threshold {
                        record.status = ServiceStatus::Unhealthy;
                    }
                    transition
                }
            };

            Some(Applied {
                previous,
                record: record.clone(),
                transition,
            })
        });

        drop(ticket);

        let Some(applied) = applied.flatten() else {
            tracing::debug!(service = %key, "Discarding probe result for replaced or removed service");
            return None;
        };

        self.emit_transitions(&applied, outcome);
        Some(applied.record)
    }

    fn emit_transitions(&self, applied: &Applied, outcome: &ProbeOutcome) {
        let record = &applied.record;
        let key = &record.key;

        match applied.transition {
            Some(Transition::Opened { next_attempt_at }) => {
                tracing::warn!(service = %key, next_attempt_at, "Circuit breaker opened");
                self.events.publish(EventKind::CircuitOpened {
                    service: key.clone(),
                    next_attempt_at,
                });
            }
            Some(Transition::Closed) => {
                tracing::info!(service = %key, "Circuit breaker closed");
                self.events.publish(EventKind::CircuitClosed {
                    service: key.clone(),
                });
            }
            None => {}
        }

        let became_unhealthy = applied.previous != ServiceStatus::Unhealthy
            && record.status == ServiceStatus::Unhealthy;
        let recovered = matches!(
            applied.previous,
            ServiceStatus::Unhealthy | ServiceStatus::Stale
        ) && record.status == ServiceStatus::Healthy;

        if became_unhealthy {
            tracing::warn!(
                service = %key,
                consecutive_failures = record.metrics.consecutive_failures,
                error = ?record.last_error,
                "Service marked unhealthy"
            );
            self.events.publish(EventKind::ServiceUnhealthy {
                service: key.clone(),
                endpoint: record.endpoint.clone(),
                error: record.last_error.clone(),
                consecutive_failures: record.metrics.consecutive_failures,
            });

            for dependent in self.dependents_of(key) {
                if self.store.status_of(&dependent) != Some(ServiceStatus::Healthy) {
                    continue;
                }
                tracing::warn!(service = %dependent, dependency = %key, "Dependency failure impacts service");
                self.events.publish(EventKind::DependencyImpact {
                    service: dependent,
                    dependency: key.clone(),
                    error: record.last_error.clone(),
                });
            }
        } else if recovered {
            tracing::info!(service = %key, from = %applied.previous, "Service recovered");
            self.events.publish(EventKind::ServiceRecovered {
                service: key.clone(),
                endpoint: record.endpoint.clone(),
                response_time_ms: outcome.elapsed_ms,
            });

            for dependent in self.dependents_of(key) {
                if !self.store.contains(&dependent) {
                    continue;
                }
                self.events.publish(EventKind::DependencyRecovered {
                    service: dependent,
                    dependency: key.clone(),
                });
            }
        }
    }

    // --- Sweeps and aggregates ---

    /// Mark healthy/unknown services silent for longer than `ttl_ms` as
    /// stale. Records are never removed.
    pub fn mark_stale_if_silent(&self, now: u64, ttl_ms: u64) -> Vec<ServiceKey> {
        let marked = self.store.mark_stale_if_silent(now, ttl_ms);
        marked
            .into_iter()
            .map(|(key, last_seen)| {
                tracing::warn!(service = %key, last_seen, "Service marked stale");
                self.events.publish(EventKind::ServiceStale {
                    service: key.clone(),
                    last_seen,
                });
                key
            })
            .collect()
    }

    /// Record the end of a scheduler cycle and publish a fresh overview.
    pub fn complete_cycle(&self, now: u64) -> Arc<HealthOverview> {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(now, Ordering::Relaxed);
        self.refresh_overview(now)
    }

    /// Recompute the overview from current records.
    pub fn refresh_overview(&self, now: u64) -> Arc<HealthOverview> {
        let last_cycle_at = match self.last_cycle_at.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        };
        let overview = Arc::new(HealthOverview::from_records(
            &self.store.list_all(),
            self.cycles.load(Ordering::Relaxed),
            last_cycle_at,
            now,
        ));
        metrics::record_overview(&overview);
        self.overview.store(overview.clone());
        overview
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}
