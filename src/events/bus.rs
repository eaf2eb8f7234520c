//! Typed lifecycle events and the publish/subscribe bus.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::metrics;
use crate::registry::key::ServiceKey;
use crate::registry::now_millis;

/// One lifecycle fact about a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "service:registered")]
    ServiceRegistered { service: ServiceKey, endpoint: String },

    #[serde(rename = "service:unregistered")]
    ServiceUnregistered { service: ServiceKey },

    #[serde(rename = "service:unhealthy")]
    ServiceUnhealthy {
        service: ServiceKey,
        endpoint: String,
        error: Option<String>,
        consecutive_failures: u32,
    },

    #[serde(rename = "service:recovered")]
    ServiceRecovered {
        service: ServiceKey,
        endpoint: String,
        response_time_ms: f64,
    },

    #[serde(rename = "service:stale")]
    ServiceStale { service: ServiceKey, last_seen: u64 },

    #[serde(rename = "circuit-breaker:opened")]
    CircuitOpened {
        service: ServiceKey,
        next_attempt_at: u64,
    },

    #[serde(rename = "circuit-breaker:closed")]
    CircuitClosed { service: ServiceKey },

    /// `dependency` went unhealthy; `service` depends on it.
    #[serde(rename = "dependency:impact")]
    DependencyImpact {
        service: ServiceKey,
        dependency: ServiceKey,
        error: Option<String>,
    },

    #[serde(rename = "dependency:recovered")]
    DependencyRecovered {
        service: ServiceKey,
        dependency: ServiceKey,
    },
}

impl EventKind {
    /// Wire name, e.g. `service:unhealthy`.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ServiceRegistered { .. } => "service:registered",
            EventKind::ServiceUnregistered { .. } => "service:unregistered",
            EventKind::ServiceUnhealthy { .. } => "service:unhealthy",
            EventKind::ServiceRecovered { .. } => "service:recovered",
            EventKind::ServiceStale { .. } => "service:stale",
            EventKind::CircuitOpened { .. } => "circuit-breaker:opened",
            EventKind::CircuitClosed { .. } => "circuit-breaker:closed",
            EventKind::DependencyImpact { .. } => "dependency:impact",
            EventKind::DependencyRecovered { .. } => "dependency:recovered",
        }
    }

    /// The service the event is about.
    pub fn service(&self) -> &ServiceKey {
        match self {
            EventKind::ServiceRegistered { service, .. }
            | EventKind::ServiceUnregistered { service }
            | EventKind::ServiceUnhealthy { service, .. }
            | EventKind::ServiceRecovered { service, .. }
            | EventKind::ServiceStale { service, .. }
            | EventKind::CircuitOpened { service, .. }
            | EventKind::CircuitClosed { service }
            | EventKind::DependencyImpact { service, .. }
            | EventKind::DependencyRecovered { service, .. } => service,
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Unique per emission; lets consumers drop redeliveries.
    pub id: Uuid,
    /// Epoch milliseconds.
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Fan-out bus with one unbounded queue per subscriber.
///
/// Delivery contract: every event published after `subscribe` reaches that
/// subscriber unless it dropped its receiver. A slow subscriber never causes
/// another to miss events. There is no ordering guarantee across kinds for
/// consumers that re-dispatch concurrently.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<RegistryEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("event bus mutex poisoned")
            .push(tx);
        rx
    }

    /// Publish to every live subscriber; closed subscribers are dropped.
    pub fn publish(&self, kind: EventKind) -> RegistryEvent {
        let event = RegistryEvent {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            kind,
        };

        tracing::debug!(
            event = event.kind.name(),
            service = %event.kind.service(),
            id = %event.id,
            "Publishing registry event"
        );
        metrics::record_event(event.kind.name());

        let mut subscribers = self.subscribers.lock().expect("event bus mutex poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        event
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus mutex poisoned")
            .len()
    }
}
