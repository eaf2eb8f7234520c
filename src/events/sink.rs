//! Delivery targets for alerts and remediation triggers.
//!
//! # Design Decisions
//! - Sinks are traits so the daemon can pick log or webhook delivery from
//!   config and tests can capture deliveries
//! - Webhook delivery retries with jittered exponential backoff and gives up
//!   after `max_attempts`

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::SinkConfig;
use crate::events::alert::{Alert, Severity};
use crate::events::remediation::RemediationTrigger;
use crate::resilience::backoff::delay_for_attempt;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("delivery abandoned after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<SinkError> },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), SinkError>;
}

#[async_trait]
pub trait RemediationSink: Send + Sync {
    async fn trigger(&self, trigger: &RemediationTrigger) -> Result<(), SinkError>;
}

/// Writes deliveries to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), SinkError> {
        match alert.severity {
            Severity::Critical => {
                tracing::error!(title = %alert.title, source = %alert.source, "{}", alert.message)
            }
            Severity::Warning => {
                tracing::warn!(title = %alert.title, source = %alert.source, "{}", alert.message)
            }
            Severity::Info => {
                tracing::info!(title = %alert.title, source = %alert.source, "{}", alert.message)
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemediationSink for LogSink {
    async fn trigger(&self, trigger: &RemediationTrigger) -> Result<(), SinkError> {
        tracing::info!(
            service = %trigger.service_id,
            action = ?trigger.action,
            endpoint = %trigger.endpoint,
            error = ?trigger.error,
            "Remediation trigger"
        );
        Ok(())
    }
}

/// POSTs JSON payloads to a URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        })
    }

    async fn post<T: Serialize + Sync>(&self, payload: &T) -> Result<(), SinkError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.client.post(&self.url).json(payload).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => SinkError::Status(response.status().as_u16()),
                Err(e) => SinkError::Request(e),
            };

            if attempt >= self.max_attempts {
                return Err(SinkError::Exhausted {
                    attempts: attempt,
                    last: Box::new(result),
                });
            }

            let delay = delay_for_attempt(attempt, self.base_delay_ms, self.max_delay_ms);
            tracing::warn!(url = %self.url, attempt, delay = ?delay, error = %result, "Webhook delivery failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), SinkError> {
        self.post(alert).await
    }
}

#[async_trait]
impl RemediationSink for WebhookSink {
    async fn trigger(&self, trigger: &RemediationTrigger) -> Result<(), SinkError> {
        self.post(trigger).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_wraps_last_failure() {
        let err = SinkError::Exhausted {
            attempts: 3,
            last: Box::new(SinkError::Status(503)),
        };
        assert_eq!(
            err.to_string(),
            "delivery abandoned after 3 attempts: webhook returned status 503"
        );
    }

    #[tokio::test]
    async fn unreachable_webhook_gives_up() {
        let config = SinkConfig {
            enabled: true,
            webhook_url: None,
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let sink = WebhookSink::new("http://127.0.0.1:1/alerts", &config).unwrap();
        let alert = Alert {
            title: "t".into(),
            message: "m".into(),
            severity: Severity::Info,
            source: "test".into(),
            metadata: Default::default(),
            timestamp: 0,
        };
        match sink.send_alert(&alert).await {
            Err(SinkError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
