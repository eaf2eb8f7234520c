//! Fleet-wide health aggregate.

use serde::Serialize;

use crate::registry::record::{ServiceRecord, ServiceStatus};
use crate::resilience::circuit_breaker::BreakerState;

/// Count of services per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub unknown: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub stale: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ServiceStatus) -> usize {
        match status {
            ServiceStatus::Unknown => self.unknown,
            ServiceStatus::Healthy => self.healthy,
            ServiceStatus::Unhealthy => self.unhealthy,
            ServiceStatus::Stale => self.stale,
        }
    }
}

/// Count of breakers per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BreakerCounts {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

impl BreakerCounts {
    pub fn get(&self, state: BreakerState) -> usize {
        match state {
            BreakerState::Closed => self.closed,
            BreakerState::Open => self.open,
            BreakerState::HalfOpen => self.half_open,
        }
    }
}

/// Snapshot published after every scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthOverview {
    pub total_services: usize,
    pub services: StatusCounts,
    pub circuit_breakers: BreakerCounts,
    /// Mean of per-service averages, over services probed at least once.
    pub average_response_time_ms: f64,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<u64>,
    pub generated_at: u64,
}

impl HealthOverview {
    pub fn from_records(
        records: &[ServiceRecord],
        cycles_completed: u64,
        last_cycle_at: Option<u64>,
        now: u64,
    ) -> Self {
        let mut services = StatusCounts::default();
        let mut circuit_breakers = BreakerCounts::default();
        let mut latency_sum = 0.0;
        let mut probed = 0usize;

        for record in records {
            match record.status {
                ServiceStatus::Unknown => services.unknown += 1,
                ServiceStatus::Healthy => services.healthy += 1,
                ServiceStatus::Unhealthy => services.unhealthy += 1,
                ServiceStatus::Stale => services.stale += 1,
            }
            match record.circuit_breaker.state() {
                BreakerState::Closed => circuit_breakers.closed += 1,
                BreakerState::Open => circuit_breakers.open += 1,
                BreakerState::HalfOpen => circuit_breakers.half_open += 1,
            }
            if record.metrics.total_checks > 0 {
                latency_sum += record.metrics.average_response_time_ms;
                probed += 1;
            }
        }

        let average_response_time_ms = if probed == 0 {
            0.0
        } else {
            latency_sum / probed as f64
        };

        Self {
            total_services: records.len(),
            services,
            circuit_breakers,
            average_response_time_ms,
            cycles_completed,
            last_cycle_at,
            generated_at: now,
        }
    }
}
