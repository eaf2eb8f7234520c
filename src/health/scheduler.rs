//! Periodic health checking.
//!
//! # Responsibilities
//! - Tick on a fixed cadence until shutdown
//! - Fan out one probe per eligible service and await them all
//! - Sweep silent services to stale and publish the cycle overview
//! - Run operator-requested checks outside the cadence
//!
//! # Design Decisions
//! - A tick that fires while a cycle is still running is skipped, never
//!   queued
//! - Shutdown is only observed between cycles, so a started cycle always
//!   finishes applying its results; a pending shutdown wins over a pending
//!   tick
//! - Each probe runs in its own task; a panic in one is logged and does not
//!   affect the others

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::config::schema::SchedulerConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::health::probe::HealthProbe;
use crate::observability::metrics;
use crate::registry::key::ServiceKey;
use crate::registry::record::ServiceRecord;
use crate::registry::service_registry::{ProbeSkip, ProbeTicket, ServiceRegistry};
use crate::registry::{now_millis, HealthOverview};

/// Summary of one scheduler cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Skipped because the breaker is open and cooling down.
    pub circuit_open: usize,
    /// Skipped because a probe for the service was still running.
    pub in_flight: usize,
    /// Services marked stale at the end of the cycle.
    pub stale: Vec<ServiceKey>,
    pub overview: Arc<HealthOverview>,
    pub duration_ms: f64,
}

#[derive(Clone)]
pub struct HealthScheduler {
    registry: Arc<ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: SchedulerConfig,
}

impl HealthScheduler {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.config.interval_ms,
            failure_threshold = self.config.failure_threshold,
            recovery_threshold = self.config.recovery_threshold,
            "Health scheduler starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health scheduler received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    tracing::debug!(
                        probed = report.probed,
                        failed = report.failed,
                        circuit_open = report.circuit_open,
                        stale = report.stale.len(),
                        duration_ms = report.duration_ms,
                        "Health check cycle complete"
                    );
                }
            }
        }
    }

    /// Run one full cycle now.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let now = now_millis();
        let mut report = CycleReport::default();
        let mut tasks = JoinSet::new();

        for key in self.registry.service_keys() {
            match self.registry.acquire_probe(&key, now, false) {
                Ok(ticket) => {
                    report.probed += 1;
                    tasks.spawn(execute(self.registry.clone(), self.probe.clone(), ticket));
                }
                Err(ProbeSkip::CircuitOpen { retry_at }) => {
                    report.circuit_open += 1;
                    tracing::debug!(service = %key, retry_at, "Circuit open, skipping probe");
                }
                Err(ProbeSkip::InFlight) => {
                    report.in_flight += 1;
                    tracing::debug!(service = %key, "Probe still in flight, skipping");
                }
                Err(ProbeSkip::NotFound) => {}
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.failed += 1,
                Err(e) => tracing::error!(error = %e, "Probe task failed"),
            }
        }

        let finished = now_millis();
        report.stale = self
            .registry
            .mark_stale_if_silent(finished, self.config.stale_ttl_ms);
        report.overview = self.registry.complete_cycle(finished);
        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        report
    }

    /// Probe one service immediately and return its updated record.
    ///
    /// An open breaker is moved to half-open without waiting for its
    /// cooldown. Fails with `ProbeInFlight` if the service is already being
    /// probed.
    pub async fn force_health_check(&self, key: &ServiceKey) -> DiscoveryResult<ServiceRecord> {
        let ticket = match self.registry.acquire_probe(key, now_millis(), true) {
            Ok(ticket) => ticket,
            Err(ProbeSkip::NotFound) => return Err(DiscoveryError::NotFound(key.clone())),
            Err(ProbeSkip::InFlight) => return Err(DiscoveryError::ProbeInFlight(key.clone())),
            Err(ProbeSkip::CircuitOpen { .. }) => return self.registry.get_service(key),
        };

        tracing::info!(service = %key, "Running forced health check");
        execute(self.registry.clone(), self.probe.clone(), ticket).await;
        self.registry.get_service(key)
    }
}

async fn execute(
    registry: Arc<ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    ticket: ProbeTicket,
) -> bool {
    let outcome = probe.probe(&ticket.target).await;
    let success = outcome.is_success();
    metrics::record_probe(&ticket.target.key.to_string(), success, outcome.elapsed_ms);
    registry.apply_probe_result(ticket, &outcome, now_millis());
    success
}
