//! Admin HTTP API.
//!
//! # Responsibilities
//! - Expose registry queries and registration over JSON
//! - Trigger forced health checks and heartbeats
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - No authentication; deploy on a trusted interface
//! - Service keys travel in the path as `name:instance` (or bare `name`)
//! - Registry errors map to 400/404/409 with a JSON `{ "error": ... }` body

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::handlers::*;
use crate::health::scheduler::HealthScheduler;
use crate::registry::service_registry::ServiceRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub scheduler: HealthScheduler,
}

impl AppState {
    pub fn new(scheduler: HealthScheduler) -> Self {
        Self {
            registry: scheduler.registry().clone(),
            scheduler,
        }
    }
}

/// Build the admin router with all middleware layers.
#[allow(deprecated)]
pub fn setup_admin_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(get_status))
        .route("/services", get(list_services).post(register_service))
        .route("/services/{key}", get(get_service).delete(unregister_service))
        .route("/services/{key}/check", post(check_service))
        .route("/services/{key}/heartbeat", post(heartbeat))
        .route("/services/{key}/dependencies", get(get_dependencies))
        .route("/groups/{name}", get(get_group))
        .route("/overview", get(get_overview))
        .route("/dependencies/cycles", get(get_cycles))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API on `listener` until shutdown.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
