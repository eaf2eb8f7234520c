//! Health probe executor.
//!
//! # Responsibilities
//! - Issue exactly one HTTP request per probe
//! - Enforce the per-service deadline
//! - Classify the outcome (connection, timeout, status, body)
//!
//! # Design Decisions
//! - Probes never touch shared state; they return a `ProbeOutcome` and the
//!   registry applies it
//! - Elapsed time comes from a monotonic clock
//! - A probe cut off at its deadline is a timeout even if the remote would
//!   have answered later

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio::time;
use url::Url;

use crate::health::expectation::{BodyExpectation, BodyMismatch};
use crate::registry::key::ServiceKey;
use crate::registry::record::ServiceRecord;

const USER_AGENT: &str = concat!("service-discovery-health/", env!("CARGO_PKG_VERSION"));

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("unexpected status {actual}, expected one of {expected:?}")]
    StatusMismatch { actual: u16, expected: Vec<u16> },

    #[error("response body mismatch: {0}")]
    BodyMismatch(#[from] BodyMismatch),

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// Only reachable for targets built by hand; registration rejects bad
    /// methods and headers.
    #[error("invalid probe request: {0}")]
    InvalidRequest(String),
}

impl ProbeError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Connection(_) => "connection",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::StatusMismatch { .. } => "status_mismatch",
            ProbeError::BodyMismatch(_) => "body_mismatch",
            ProbeError::MalformedBody(_) => "malformed_body",
            ProbeError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Everything a probe needs, detached from the registry.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub key: ServiceKey,
    pub url: Url,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub expected_status: Vec<u16>,
    pub expected_body: Option<BodyExpectation>,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn from_record(record: &ServiceRecord) -> Self {
        let check = &record.health_check;
        Self {
            key: record.key.clone(),
            url: record.health_url.clone(),
            method: check.method.clone(),
            headers: check.headers.clone(),
            expected_status: check.expected_status.clone(),
            expected_body: check.expected_response.clone(),
            timeout: Duration::from_millis(check.timeout_ms),
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Wall time of the round trip in milliseconds.
    pub elapsed_ms: f64,
    /// Response status on success.
    pub result: Result<u16, ProbeError>,
}

impl ProbeOutcome {
    pub fn success(status: u16, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            result: Ok(status),
        }
    }

    pub fn failure(error: ProbeError, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.result.as_ref().err()
    }
}

/// Something that can check one service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// HTTP prober backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    async fn execute(&self, target: &ProbeTarget) -> Result<u16, ProbeError> {
        let method = reqwest::Method::from_bytes(target.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ProbeError::InvalidRequest(e.to_string()))?;
        let headers = build_headers(&target.headers)?;

        let response = self
            .client
            .request(method, target.url.clone())
            .headers(headers)
            .timeout(target.timeout)
            .send()
            .await
            .map_err(|e| classify(e, target.timeout))?;

        let status = response.status().as_u16();
        if !target.expected_status.contains(&status) {
            return Err(ProbeError::StatusMismatch {
                actual: status,
                expected: target.expected_status.clone(),
            });
        }

        if let Some(expectation) = &target.expected_body {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify(e, target.timeout))?;
            let body: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| ProbeError::MalformedBody(e.to_string()))?;
            expectation.check(&body)?;
        }

        Ok(status)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let started = Instant::now();
        let result = match time::timeout(target.timeout, self.execute(target)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(target.timeout.as_millis() as u64)),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(status) => {
                tracing::debug!(service = %target.key, status, elapsed_ms, "Health probe succeeded")
            }
            Err(e) => {
                tracing::debug!(service = %target.key, kind = e.kind(), error = %e, elapsed_ms, "Health probe failed")
            }
        }

        ProbeOutcome { elapsed_ms, result }
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout(timeout.as_millis() as u64)
    } else {
        ProbeError::Connection(error.to_string())
    }
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ProbeError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProbeError::InvalidRequest(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProbeError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("x-probe".to_string(), "1".to_string());
        let map = build_headers(&headers).unwrap();
        assert_eq!(map.get("x-probe").unwrap(), "1");
    }

    #[test]
    fn rejects_bad_header_name() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "1".to_string());
        assert!(matches!(
            build_headers(&headers),
            Err(ProbeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn error_kinds_are_distinct() {
        let kinds = [
            ProbeError::Connection("refused".into()).kind(),
            ProbeError::Timeout(10).kind(),
            ProbeError::StatusMismatch { actual: 500, expected: vec![200] }.kind(),
            ProbeError::MalformedBody("eof".into()).kind(),
        ];
        let unique: std::collections::BTreeSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[tokio::test]
    async fn closed_port_is_a_connection_failure() {
        let target = ProbeTarget {
            key: ServiceKey::new("ghost", "default"),
            url: Url::parse("http://127.0.0.1:1/health").unwrap(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            expected_status: vec![200],
            expected_body: None,
            timeout: Duration::from_millis(500),
        };
        let outcome = HttpProbe::new().unwrap().probe(&target).await;
        assert!(matches!(
            outcome.result,
            Err(ProbeError::Connection(_)) | Err(ProbeError::Timeout(_))
        ));
        assert!(outcome.elapsed_ms >= 0.0);
    }
}
