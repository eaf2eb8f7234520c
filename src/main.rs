//! Service discovery daemon.
//!
//! Keeps a live registry of backend services, probes them on a fixed
//! cadence, and reports health transitions to alerting and remediation
//! consumers.
//!
//! # Architecture Overview
//!
//! ```text
//!   discovery.toml ──▶ config ──▶ lifecycle::startup ──▶ ServiceRegistry
//!        │                                                  ▲      │
//!        └── watcher (reload) ── reconcile_services ────────┘      │ events
//!                                                                  ▼
//!   HealthScheduler ── tick ──▶ probe (HTTP) ──▶ apply result   EventBus
//!        ▲                                                    │        │
//!        │                                          alert dispatcher   remediation dispatcher
//!   admin API (axum) ◀──── operators / discovery-cli          │        │
//!                                                          log / webhook sinks
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use service_discovery::admin::{self, AppState};
use service_discovery::config::{self, ConfigWatcher, DiscoveryConfig};
use service_discovery::health::{HealthScheduler, HttpProbe};
use service_discovery::lifecycle::{self, signals, startup, Shutdown};
use service_discovery::observability::{logging, metrics};
use service_discovery::registry::ServiceRegistry;

const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "discovery")]
#[command(about = "Service discovery and health monitoring daemon", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "discovery.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = config::load_config(&args.config)?;
    logging::init(&config.observability).map_err(|e| e as Box<dyn std::error::Error>)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        services = config.services.len(),
        interval_ms = config.scheduler.interval_ms,
        "discovery starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let dispatch_shutdown = Shutdown::new();
    let registry = Arc::new(ServiceRegistry::new(config.scheduler.breaker_policy()));

    let dispatchers = startup::spawn_dispatchers(&registry, &config, &dispatch_shutdown)?;
    let mut tasks = Vec::new();

    let registered = startup::register_services(&registry, &config.services);
    tracing::info!(registered, configured = config.services.len(), "Configured services registered");

    let probe = Arc::new(HttpProbe::new()?);
    let scheduler = HealthScheduler::new(registry.clone(), probe, config.scheduler);
    tasks.push((
        "health-scheduler",
        tokio::spawn(scheduler.clone().run(shutdown.subscribe())),
    ));

    let _watcher = if args.no_watch {
        None
    } else {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        let handle = watcher.run()?;
        tasks.push((
            "config-reload",
            tokio::spawn(reload_loop(registry.clone(), config.clone(), updates, shutdown.subscribe())),
        ));
        Some(handle)
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::setup_admin_router(
            AppState::new(scheduler),
            Duration::from_secs(config.admin.request_timeout_secs),
        );
        let admin_shutdown = shutdown.subscribe();
        tasks.push((
            "admin-api",
            tokio::spawn(async move {
                if let Err(e) = admin::serve(listener, router, admin_shutdown).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }),
        ));
    }

    let signal = signals::wait_for_signal().await;
    tracing::info!(signal, "Shutdown signal received, draining");
    lifecycle::stop_in_order(
        vec![(shutdown, tasks), (dispatch_shutdown, dispatchers)],
        DRAIN_DEADLINE,
    )
    .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply reloaded configs until shutdown.
///
/// Scheduler thresholds and listener addresses need a restart; only the
/// service list is reconciled live.
async fn reload_loop(
    registry: Arc<ServiceRegistry>,
    mut current: DiscoveryConfig,
    mut updates: tokio::sync::mpsc::UnboundedReceiver<DiscoveryConfig>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(next) = update else { break };
                if next.scheduler != current.scheduler
                    || next.admin != current.admin
                    || next.observability != current.observability
                {
                    tracing::warn!("Only [[services]] changes apply without a restart");
                }
                startup::reconcile_services(&registry, &current.services, &next.services);
                current = next;
            }
            _ = shutdown.recv() => break,
        }
    }
}
