//! Service registration input and the stored service record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::health::expectation::BodyExpectation;
use crate::registry::key::{ServiceKey, DEFAULT_INSTANCE};
use crate::resilience::circuit_breaker::{BreakerPolicy, CircuitBreaker};

/// Derived health status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Unknown,
    Healthy,
    Unhealthy,
    Stale,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 4] = [
        ServiceStatus::Unknown,
        ServiceStatus::Healthy,
        ServiceStatus::Unhealthy,
        ServiceStatus::Stale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Stale => "stale",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status {s:?}"))
    }
}

/// Scheme used to reach a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// How a service is probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSpec {
    /// Path appended to the service endpoint.
    pub path: String,

    /// HTTP method.
    pub method: String,

    /// Status codes counted as healthy.
    pub expected_status: Vec<u16>,

    /// Fields the JSON body must contain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_response: Option<BodyExpectation>,

    /// Extra request headers.
    pub headers: BTreeMap<String, String>,

    /// Probe deadline in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            method: "GET".to_string(),
            expected_status: vec![200],
            expected_response: None,
            headers: BTreeMap::new(),
            timeout_ms: 5_000,
        }
    }
}

fn default_instance() -> String {
    DEFAULT_INSTANCE.to_string()
}

/// Registration request for one service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_instance")]
    pub instance: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub health_check: HealthCheckSpec,

    /// Keys (`name` or `name:instance`) of services this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServiceConfig {
    /// Minimal config for a named service on `host:port`.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            instance: default_instance(),
            version: String::new(),
            host: host.into(),
            port,
            protocol: Protocol::Http,
            health_check: HealthCheckSpec::default(),
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.name.trim(), self.instance.trim())
    }

    /// `protocol://host:port`
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host.trim(), self.port)
    }

    /// Semantic checks; returns the parsed dependency keys.
    ///
    /// All problems are reported, not just the first.
    pub fn validate(&self) -> Result<BTreeSet<ServiceKey>, Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name is required".to_string());
        } else if self.name.contains(':') || self.name.chars().any(char::is_whitespace) {
            errors.push(format!("name {:?} must not contain ':' or whitespace", self.name));
        }
        if self.instance.trim().is_empty() || self.instance.contains(':') {
            errors.push(format!("instance {:?} is invalid", self.instance));
        }
        if self.host.trim().is_empty() {
            errors.push("host is required".to_string());
        }
        if self.port == 0 {
            errors.push("port is required".to_string());
        }

        let check = &self.health_check;
        if !check.path.starts_with('/') {
            errors.push(format!("health_check.path {:?} must start with '/'", check.path));
        }
        let method = check.method.trim().to_ascii_uppercase();
        if reqwest::Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(format!("health_check.method {:?} is not a valid HTTP method", check.method));
        }
        for (name, value) in &check.headers {
            if let Err(e) = HeaderName::from_bytes(name.as_bytes()) {
                errors.push(format!("health_check.headers: {name:?}: {e}"));
            }
            if let Err(e) = HeaderValue::from_str(value) {
                errors.push(format!("health_check.headers: value of {name:?}: {e}"));
            }
        }
        if check.expected_status.is_empty() {
            errors.push("health_check.expected_status must not be empty".to_string());
        }
        if let Some(code) = check.expected_status.iter().find(|c| !(100..=599).contains(*c)) {
            errors.push(format!("health_check.expected_status contains invalid code {code}"));
        }
        if check.timeout_ms == 0 {
            errors.push("health_check.timeout_ms must be greater than 0".to_string());
        }

        if errors.is_empty() && self.health_url().is_err() {
            errors.push(format!("endpoint {} is not a valid URL", self.endpoint()));
        }

        let own_key = self.key();
        let mut dependencies = BTreeSet::new();
        for raw in &self.dependencies {
            match raw.parse::<ServiceKey>() {
                Ok(dep) if dep == own_key => {
                    errors.push(format!("service cannot depend on itself ({dep})"));
                }
                Ok(dep) => {
                    dependencies.insert(dep);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            Ok(dependencies)
        } else {
            Err(errors)
        }
    }

    fn health_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.endpoint())?.join(&self.health_check.path)
    }
}

/// Probe counters for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCounters {
    pub total_checks: u64,
    pub failed_checks: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub average_response_time_ms: f64,
}

impl HealthCounters {
    pub fn record_success(&mut self, elapsed_ms: f64) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        self.record_latency(elapsed_ms);
    }

    pub fn record_failure(&mut self, elapsed_ms: f64) {
        self.failed_checks += 1;
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.record_latency(elapsed_ms);
    }

    // Incremental mean: avg += (x - avg) / n
    fn record_latency(&mut self, elapsed_ms: f64) {
        self.total_checks += 1;
        self.average_response_time_ms +=
            (elapsed_ms - self.average_response_time_ms) / self.total_checks as f64;
    }
}

/// A registered service instance.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecord {
    pub key: ServiceKey,
    pub name: String,
    pub instance: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub endpoint: String,
    pub health_url: Url,
    pub health_check: HealthCheckSpec,
    pub dependencies: BTreeSet<ServiceKey>,
    pub metadata: BTreeMap<String, Value>,
    pub tags: Vec<String>,

    /// Epoch milliseconds.
    pub registered_at: u64,
    pub last_seen: u64,
    pub last_health_check: Option<u64>,

    pub status: ServiceStatus,
    pub metrics: HealthCounters,
    pub last_error: Option<String>,
    pub circuit_breaker: CircuitBreaker,

    /// Distinguishes successive registrations of the same key.
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl ServiceRecord {
    /// Build a fresh record from a validated config.
    pub(crate) fn from_config(
        config: ServiceConfig,
        dependencies: BTreeSet<ServiceKey>,
        policy: BreakerPolicy,
        now: u64,
        generation: u64,
    ) -> Result<Self, url::ParseError> {
        let health_url = config.health_url()?;
        let key = config.key();
        let endpoint = config.endpoint();
        let mut health_check = config.health_check;
        health_check.method = health_check.method.trim().to_ascii_uppercase();
        Ok(Self {
            endpoint,
            name: key.name().to_string(),
            instance: key.instance().to_string(),
            key,
            version: config.version,
            host: config.host.trim().to_string(),
            port: config.port,
            protocol: config.protocol,
            health_url,
            health_check,
            dependencies,
            metadata: config.metadata,
            tags: config.tags,
            registered_at: now,
            last_seen: now,
            last_health_check: None,
            status: ServiceStatus::Unknown,
            metrics: HealthCounters::default(),
            last_error: None,
            circuit_breaker: CircuitBreaker::new(policy),
            generation,
        })
    }
}
