//! Alerts for the incident sink.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::events::bus::{EventKind, RegistryEvent};

/// Source tag attached to every alert.
pub const ALERT_SOURCE: &str = "service-discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Structured incident notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub source: String,
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: u64,
}

/// Alert for an event, if the event warrants one.
///
/// Only `service:unhealthy` and `dependency:impact` raise alerts.
pub fn alert_for(event: &RegistryEvent) -> Option<Alert> {
    let mut metadata = BTreeMap::new();
    metadata.insert("event_id".to_string(), json!(event.id));
    metadata.insert("event".to_string(), json!(event.kind.name()));

    let (title, message, severity) = match &event.kind {
        EventKind::ServiceUnhealthy {
            service,
            endpoint,
            error,
            consecutive_failures,
        } => {
            metadata.insert("service".to_string(), json!(service));
            metadata.insert("endpoint".to_string(), json!(endpoint));
            metadata.insert("consecutive_failures".to_string(), json!(consecutive_failures));
            if let Some(error) = error {
                metadata.insert("error".to_string(), json!(error));
            }
            (
                format!("Service {service} is unhealthy"),
                format!(
                    "{service} at {endpoint} failed {consecutive_failures} consecutive health checks: {}",
                    error.as_deref().unwrap_or("no detail")
                ),
                Severity::Critical,
            )
        }
        EventKind::DependencyImpact {
            service,
            dependency,
            error,
        } => {
            metadata.insert("service".to_string(), json!(service));
            metadata.insert("dependency".to_string(), json!(dependency));
            (
                format!("Dependency {dependency} of {service} is unhealthy"),
                format!(
                    "{service} depends on {dependency}, which is failing health checks: {}",
                    error.as_deref().unwrap_or("no detail")
                ),
                Severity::Warning,
            )
        }
        _ => return None,
    };

    Some(Alert {
        title,
        message,
        severity,
        source: ALERT_SOURCE.to_string(),
        metadata,
        timestamp: event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::key::ServiceKey;
    use uuid::Uuid;

    fn event(kind: EventKind) -> RegistryEvent {
        RegistryEvent {
            id: Uuid::new_v4(),
            timestamp: 1_000,
            kind,
        }
    }

    #[test]
    fn unhealthy_service_is_critical() {
        let alert = alert_for(&event(EventKind::ServiceUnhealthy {
            service: ServiceKey::new("orders", "default"),
            endpoint: "http://orders:80".into(),
            error: Some("timed out after 5000 ms".into()),
            consecutive_failures: 3,
        }))
        .unwrap();

        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.source, ALERT_SOURCE);
        assert!(alert.title.contains("orders:default"));
        assert!(alert.message.contains("timed out"));
        assert_eq!(alert.metadata["consecutive_failures"], json!(3));
        assert_eq!(alert.timestamp, 1_000);
    }

    #[test]
    fn dependency_impact_is_a_warning() {
        let alert = alert_for(&event(EventKind::DependencyImpact {
            service: ServiceKey::new("billing", "default"),
            dependency: ServiceKey::new("orders", "default"),
            error: None,
        }))
        .unwrap();

        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.metadata["dependency"], json!("orders:default"));
    }

    #[test]
    fn other_events_do_not_alert() {
        let kind = EventKind::CircuitClosed {
            service: ServiceKey::new("orders", "default"),
        };
        assert!(alert_for(&event(kind)).is_none());
    }
}
