//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, thresholds >= 1)
//! - Validate addresses and webhook URLs
//! - Validate every configured service and reject duplicate keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DiscoveryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{DiscoveryConfig, SinkConfig};

/// One semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &DiscoveryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let scheduler = &config.scheduler;
    if scheduler.interval_ms == 0 {
        errors.push(ValidationError::new("scheduler.interval_ms", "must be greater than 0"));
    }
    if scheduler.failure_threshold == 0 {
        errors.push(ValidationError::new("scheduler.failure_threshold", "must be at least 1"));
    }
    if scheduler.recovery_threshold == 0 {
        errors.push(ValidationError::new("scheduler.recovery_threshold", "must be at least 1"));
    }
    if scheduler.circuit_breaker_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "scheduler.circuit_breaker_timeout_ms",
            "must be greater than 0",
        ));
    }
    if scheduler.stale_ttl_ms == 0 {
        errors.push(ValidationError::new("scheduler.stale_ttl_ms", "must be greater than 0"));
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "admin.request_timeout_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_sink(&mut errors, "alerts", &config.alerts);
    check_sink(&mut errors, "remediation", &config.remediation);

    let mut seen = BTreeSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{i}]");
        if let Err(problems) = service.validate() {
            errors.extend(problems.into_iter().map(|p| ValidationError::new(&field, p)));
            continue;
        }
        let key = service.key();
        if !seen.insert(key.clone()) {
            errors.push(ValidationError::new(field, format!("duplicate service {key}")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, addr: &str) {
    if addr.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{addr:?} is not a socket address")));
    }
}

fn check_sink(errors: &mut Vec<ValidationError>, section: &str, sink: &SinkConfig) {
    if let Some(url) = &sink.webhook_url {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                format!("{section}.webhook_url"),
                format!("{url:?} is not an http(s) URL"),
            )),
        }
    }
    if sink.max_attempts == 0 {
        errors.push(ValidationError::new(
            format!("{section}.max_attempts"),
            "must be at least 1",
        ));
    }
    if sink.base_delay_ms > sink.max_delay_ms {
        errors.push(ValidationError::new(
            format!("{section}.base_delay_ms"),
            "must not exceed max_delay_ms",
        ));
    }
}
