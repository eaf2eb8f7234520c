//! Metrics collection and exposition.
//!
//! # Metrics
//! - `discovery_probes_total` (counter): probes by service and outcome
//! - `discovery_probe_duration_seconds` (histogram): probe latency by service
//! - `discovery_services` (gauge): registered services by status
//! - `discovery_circuit_breakers` (gauge): breakers by state
//! - `discovery_fleet_response_time_ms` (gauge): mean response time
//! - `discovery_events_total` (counter): published events by kind

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::overview::HealthOverview;
use crate::registry::record::ServiceStatus;
use crate::resilience::circuit_breaker::BreakerState;

const BREAKER_STATES: [BreakerState; 3] = [
    BreakerState::Closed,
    BreakerState::Open,
    BreakerState::HalfOpen,
];

/// Start the Prometheus scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_probe(service: &str, success: bool, elapsed_ms: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("discovery_probes_total", "service" => service.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("discovery_probe_duration_seconds", "service" => service.to_string())
        .record(elapsed_ms / 1000.0);
}

pub fn record_event(kind: &'static str) {
    counter!("discovery_events_total", "kind" => kind).increment(1);
}

pub fn record_overview(overview: &HealthOverview) {
    for status in ServiceStatus::ALL {
        gauge!("discovery_services", "status" => status.as_str())
            .set(overview.services.get(status) as f64);
    }
    for state in BREAKER_STATES {
        gauge!("discovery_circuit_breakers", "state" => state.as_str())
            .set(overview.circuit_breakers.get(state) as f64);
    }
    gauge!("discovery_fleet_response_time_ms").set(overview.average_response_time_ms);
}
