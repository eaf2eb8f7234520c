//! Background tasks forwarding registry events to external collaborators.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::events::alert::alert_for;
use crate::events::bus::RegistryEvent;
use crate::events::remediation::trigger_for;
use crate::events::sink::{AlertSink, RemediationSink};

/// Deliver alerts for incoming events until shutdown.
///
/// Events already queued when shutdown arrives are still delivered.
pub async fn run_alert_dispatcher(
    mut events: mpsc::UnboundedReceiver<RegistryEvent>,
    sink: Arc<dyn AlertSink>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Alert dispatcher starting");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => deliver_alert(&event, sink.as_ref()).await,
                None => break,
            },
            _ = shutdown.recv() => {
                while let Ok(event) = events.try_recv() {
                    deliver_alert(&event, sink.as_ref()).await;
                }
                break;
            }
        }
    }
    tracing::info!("Alert dispatcher stopped");
}

/// Deliver remediation triggers for incoming events until shutdown.
pub async fn run_remediation_dispatcher(
    mut events: mpsc::UnboundedReceiver<RegistryEvent>,
    sink: Arc<dyn RemediationSink>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Remediation dispatcher starting");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => deliver_trigger(&event, sink.as_ref()).await,
                None => break,
            },
            _ = shutdown.recv() => {
                while let Ok(event) = events.try_recv() {
                    deliver_trigger(&event, sink.as_ref()).await;
                }
                break;
            }
        }
    }
    tracing::info!("Remediation dispatcher stopped");
}

async fn deliver_alert(event: &RegistryEvent, sink: &dyn AlertSink) {
    let Some(alert) = alert_for(event) else {
        return;
    };
    if let Err(e) = sink.send_alert(&alert).await {
        tracing::error!(event_id = %event.id, title = %alert.title, error = %e, "Failed to deliver alert");
    }
}

async fn deliver_trigger(event: &RegistryEvent, sink: &dyn RemediationSink) {
    let Some(trigger) = trigger_for(event) else {
        return;
    };
    if let Err(e) = sink.trigger(&trigger).await {
        tracing::error!(event_id = %event.id, service = %trigger.service_id, error = %e, "Failed to deliver remediation trigger");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::events::alert::Alert;
    use crate::events::bus::{EventBus, EventKind};
    use crate::events::remediation::{RemediationAction, RemediationTrigger};
    use crate::events::sink::SinkError;
    use crate::lifecycle::Shutdown;
    use crate::registry::key::ServiceKey;

    #[derive(Default)]
    struct Capture {
        alerts: Mutex<Vec<Alert>>,
        triggers: Mutex<Vec<RemediationTrigger>>,
    }

    #[async_trait]
    impl AlertSink for Capture {
        async fn send_alert(&self, alert: &Alert) -> Result<(), SinkError> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl RemediationSink for Capture {
        async fn trigger(&self, trigger: &RemediationTrigger) -> Result<(), SinkError> {
            self.triggers.lock().unwrap().push(trigger.clone());
            Ok(())
        }
    }

    fn unhealthy() -> EventKind {
        EventKind::ServiceUnhealthy {
            service: ServiceKey::new("orders", "default"),
            endpoint: "http://orders:80".into(),
            error: Some("refused".into()),
            consecutive_failures: 3,
        }
    }

    #[tokio::test]
    async fn queued_events_drain_on_shutdown() {
        let bus = EventBus::new();
        let capture = Arc::new(Capture::default());
        let shutdown = Shutdown::new();

        let alerts = bus.subscribe();
        let triggers = bus.subscribe();

        bus.publish(unhealthy());
        bus.publish(EventKind::CircuitClosed {
            service: ServiceKey::new("orders", "default"),
        });
        bus.publish(EventKind::ServiceRecovered {
            service: ServiceKey::new("orders", "default"),
            endpoint: "http://orders:80".into(),
            response_time_ms: 3.0,
        });

        let alert_task = tokio::spawn(run_alert_dispatcher(
            alerts,
            capture.clone(),
            shutdown.subscribe(),
        ));
        let trigger_task = tokio::spawn(run_remediation_dispatcher(
            triggers,
            capture.clone(),
            shutdown.subscribe(),
        ));

        shutdown.trigger();
        alert_task.await.unwrap();
        trigger_task.await.unwrap();

        assert_eq!(capture.alerts.lock().unwrap().len(), 1);
        let triggers = capture.triggers.lock().unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].action, RemediationAction::Restart);
        assert_eq!(triggers[1].action, RemediationAction::Recovered);
    }
}
