//! Trigger payloads for the remediation consumer.

use serde::{Deserialize, Serialize};

use crate::events::bus::{EventKind, RegistryEvent};

/// What the consumer is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    /// Service went unhealthy; a restart or replacement may be warranted.
    Restart,
    /// Service came back; pending remediation can be cancelled.
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationTrigger {
    pub service_id: String,
    pub service_name: String,
    pub endpoint: String,
    pub action: RemediationAction,
    pub error: Option<String>,
    pub response_time_ms: Option<f64>,
    pub event_id: uuid::Uuid,
    pub timestamp: u64,
}

/// Trigger for `service:unhealthy` and `service:recovered`; `None` otherwise.
pub fn trigger_for(event: &RegistryEvent) -> Option<RemediationTrigger> {
    let (service, endpoint, action, error, response_time_ms) = match &event.kind {
        EventKind::ServiceUnhealthy {
            service,
            endpoint,
            error,
            ..
        } => (service, endpoint, RemediationAction::Restart, error.clone(), None),
        EventKind::ServiceRecovered {
            service,
            endpoint,
            response_time_ms,
        } => (
            service,
            endpoint,
            RemediationAction::Recovered,
            None,
            Some(*response_time_ms),
        ),
        _ => return None,
    };

    Some(RemediationTrigger {
        service_id: service.to_string(),
        service_name: service.name().to_string(),
        endpoint: endpoint.clone(),
        action,
        error,
        response_time_ms,
        event_id: event.id,
        timestamp: event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::key::ServiceKey;
    use uuid::Uuid;

    #[test]
    fn recovered_carries_latency() {
        let event = RegistryEvent {
            id: Uuid::new_v4(),
            timestamp: 5,
            kind: EventKind::ServiceRecovered {
                service: ServiceKey::new("orders", "blue"),
                endpoint: "http://10.0.0.1:80".into(),
                response_time_ms: 12.5,
            },
        };
        let trigger = trigger_for(&event).unwrap();
        assert_eq!(trigger.service_id, "orders:blue");
        assert_eq!(trigger.service_name, "orders");
        assert_eq!(trigger.action, RemediationAction::Recovered);
        assert_eq!(trigger.response_time_ms, Some(12.5));
        assert_eq!(trigger.event_id, event.id);
    }

    #[test]
    fn stale_is_not_a_trigger() {
        let event = RegistryEvent {
            id: Uuid::new_v4(),
            timestamp: 5,
            kind: EventKind::ServiceStale {
                service: ServiceKey::new("orders", "default"),
                last_seen: 1,
            },
        };
        assert!(trigger_for(&event).is_none());
    }
}
