//! Startup orchestration.
//!
//! # Responsibilities
//! - Register the configured services
//! - Reconcile the registry when the config file changes
//! - Build delivery sinks and start the event dispatchers
//!
//! # Design Decisions
//! - Dispatchers subscribe before any service is registered, so the first
//!   `service:registered` events are delivered too
//! - A service that fails to register is logged and skipped; the others
//!   still start
//! - Reload only touches services that came from the config file; services
//!   registered through the admin API are left alone

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::schema::{DiscoveryConfig, SinkConfig};
use crate::events::dispatch::{run_alert_dispatcher, run_remediation_dispatcher};
use crate::events::sink::{AlertSink, LogSink, RemediationSink, SinkError, WebhookSink};
use crate::lifecycle::shutdown::Shutdown;
use crate::registry::key::ServiceKey;
use crate::registry::record::ServiceConfig;
use crate::registry::service_registry::ServiceRegistry;

/// What a reconciliation pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub registered: Vec<ServiceKey>,
    pub updated: Vec<ServiceKey>,
    pub removed: Vec<ServiceKey>,
    pub failed: Vec<ServiceKey>,
}

/// Register every configured service; returns how many succeeded.
pub fn register_services(registry: &ServiceRegistry, services: &[ServiceConfig]) -> usize {
    services
        .iter()
        .filter(|config| match registry.register_service(ServiceConfig::clone(config)) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(service = %config.key(), error = %e, "Failed to register configured service");
                false
            }
        })
        .count()
}

/// Bring the registry in line with a reloaded service list.
///
/// Removed entries are unregistered; new or changed entries are
/// (re)registered. Unchanged entries keep their health history.
pub fn reconcile_services(
    registry: &ServiceRegistry,
    previous: &[ServiceConfig],
    next: &[ServiceConfig],
) -> Reconciliation {
    let before: BTreeMap<ServiceKey, &ServiceConfig> =
        previous.iter().map(|c| (c.key(), c)).collect();
    let after: BTreeMap<ServiceKey, &ServiceConfig> = next.iter().map(|c| (c.key(), c)).collect();
    let mut outcome = Reconciliation::default();

    for key in before.keys().filter(|k| !after.contains_key(*k)) {
        if registry.unregister_service(key) {
            outcome.removed.push(key.clone());
        }
    }

    for (key, config) in &after {
        let changed = match before.get(key) {
            Some(old) if old == config => continue,
            Some(_) => true,
            None => false,
        };
        match registry.register_service(ServiceConfig::clone(config)) {
            Ok(_) if changed => outcome.updated.push(key.clone()),
            Ok(_) => outcome.registered.push(key.clone()),
            Err(e) => {
                tracing::error!(service = %key, error = %e, "Failed to apply reloaded service");
                outcome.failed.push(key.clone());
            }
        }
    }

    tracing::info!(
        registered = outcome.registered.len(),
        updated = outcome.updated.len(),
        removed = outcome.removed.len(),
        failed = outcome.failed.len(),
        "Service list reconciled"
    );
    outcome
}

pub fn alert_sink(config: &SinkConfig) -> Result<Arc<dyn AlertSink>, SinkError> {
    Ok(match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone(), config)?),
        None => Arc::new(LogSink),
    })
}

pub fn remediation_sink(config: &SinkConfig) -> Result<Arc<dyn RemediationSink>, SinkError> {
    Ok(match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone(), config)?),
        None => Arc::new(LogSink),
    })
}

/// Subscribe and spawn the enabled dispatchers.
pub fn spawn_dispatchers(
    registry: &ServiceRegistry,
    config: &DiscoveryConfig,
    shutdown: &Shutdown,
) -> Result<Vec<(&'static str, JoinHandle<()>)>, SinkError> {
    let mut tasks = Vec::new();

    if config.alerts.enabled {
        let sink = alert_sink(&config.alerts)?;
        let handle = tokio::spawn(run_alert_dispatcher(
            registry.subscribe(),
            sink,
            shutdown.subscribe(),
        ));
        tasks.push(("alert-dispatcher", handle));
    }

    if config.remediation.enabled {
        let sink = remediation_sink(&config.remediation)?;
        let handle = tokio::spawn(run_remediation_dispatcher(
            registry.subscribe(),
            sink,
            shutdown.subscribe(),
        ));
        tasks.push(("remediation-dispatcher", handle));
    }

    Ok(tasks)
}
