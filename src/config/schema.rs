//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::record::ServiceConfig;
use crate::resilience::circuit_breaker::BreakerPolicy;

/// Root configuration for the discovery daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Probe cadence and breaker thresholds.
    pub scheduler: SchedulerConfig,

    /// Admin HTTP API.
    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Incident notifications.
    pub alerts: SinkConfig,

    /// Remediation triggers.
    pub remediation: SinkConfig,

    /// Services registered at startup and reconciled on reload.
    pub services: Vec<ServiceConfig>,
}

/// Health check scheduler settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between probe cycles.
    pub interval_ms: u64,

    /// Consecutive failures before a service is unhealthy and its breaker opens.
    pub failure_threshold: u32,

    /// Consecutive half-open successes before the breaker closes.
    pub recovery_threshold: u32,

    /// How long an open breaker blocks probes.
    pub circuit_breaker_timeout_ms: u64,

    /// Silence after which a healthy/unknown service becomes stale.
    pub stale_ttl_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            failure_threshold: 3,
            recovery_threshold: 2,
            circuit_breaker_timeout_ms: 60_000,
            stale_ttl_ms: 300_000,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
            open_timeout_ms: self.circuit_breaker_timeout_ms,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request deadline.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Delivery settings for alerts or remediation triggers.
///
/// Without a `webhook_url`, deliveries go to the log.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SinkConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: DiscoveryConfig = toml::from_str("").unwrap();
        assert_eq!(config, DiscoveryConfig::default());
        assert_eq!(config.scheduler.interval(), Duration::from_secs(30));
    }

    #[test]
    fn parses_full_file() {
        let config: DiscoveryConfig = toml::from_str(
            r#"
            [scheduler]
            interval_ms = 1000
            failure_threshold = 5

            [observability]
            log_format = "json"
            metrics_enabled = false

            [alerts]
            webhook_url = "http://hooks.local/alerts"

            [[services]]
            name = "orders"
            host = "10.0.0.5"
            port = 8080

            [[services]]
            name = "billing"
            instance = "eu"
            host = "10.0.0.6"
            port = 8080
            dependencies = ["orders"]
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.interval_ms, 1000);
        assert_eq!(config.scheduler.recovery_threshold, 2);
        let policy = config.scheduler.breaker_policy();
        assert_eq!(policy.failure_threshold, 5);
        assert_eq!(policy.open_timeout_ms, 60_000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(
            config.alerts.webhook_url.as_deref(),
            Some("http://hooks.local/alerts")
        );
        assert!(config.remediation.webhook_url.is_none());
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].key().to_string(), "billing:eu");
    }
}
