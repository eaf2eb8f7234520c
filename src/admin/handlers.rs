//! Admin API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AppState;
use crate::error::DiscoveryError;
use crate::graph::DependencyNode;
use crate::registry::key::{InvalidServiceKey, ServiceKey};
use crate::registry::overview::HealthOverview;
use crate::registry::record::{ServiceConfig, ServiceRecord, ServiceStatus};

/// Error body returned by every failing handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        let status = match err {
            DiscoveryError::Registration(_) => StatusCode::BAD_REQUEST,
            DiscoveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DiscoveryError::ProbeInFlight(_) => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<InvalidServiceKey> for ApiError {
    fn from(err: InvalidServiceKey) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct CyclesResponse {
    pub count: usize,
    pub cycles: Vec<Vec<ServiceKey>>,
}

#[derive(Serialize)]
pub struct DependencyResponse {
    pub service: ServiceKey,
    pub dependents: Vec<ServiceKey>,
    pub tree: DependencyNode,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services: state.registry.len(),
    })
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ServiceRecord>>> {
    let services = match query.status {
        Some(raw) => {
            let status: ServiceStatus = raw.parse().map_err(ApiError::bad_request)?;
            state.registry.get_services_by_status(status)
        }
        None => state.registry.get_all_services(),
    };
    Ok(Json(services))
}

pub async fn register_service(
    State(state): State<AppState>,
    Json(config): Json<ServiceConfig>,
) -> ApiResult<(StatusCode, Json<ServiceRecord>)> {
    let record = state.registry.register_service(config)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
    let key: ServiceKey = key.parse()?;
    Ok(Json(state.registry.get_service(&key)?))
}

pub async fn unregister_service(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    let key: ServiceKey = key.parse()?;
    if state.registry.unregister_service(&key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DiscoveryError::NotFound(key).into())
    }
}

pub async fn check_service(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
    let key: ServiceKey = key.parse()?;
    Ok(Json(state.scheduler.force_health_check(&key).await?))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
    let key: ServiceKey = key.parse()?;
    Ok(Json(state.registry.heartbeat(&key)?))
}

pub async fn get_dependencies(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<DependencyResponse>> {
    let key: ServiceKey = key.parse()?;
    let tree = state.registry.get_dependency_tree(&key)?;
    Ok(Json(DependencyResponse {
        dependents: state.registry.dependents_of(&key),
        service: key,
        tree,
    }))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<ServiceRecord>> {
    Json(state.registry.get_instances(&name))
}

pub async fn get_overview(State(state): State<AppState>) -> Json<HealthOverview> {
    Json(state.registry.get_health_overview().as_ref().clone())
}

pub async fn get_cycles(State(state): State<AppState>) -> Json<CyclesResponse> {
    let cycles = state.registry.detect_circular_dependencies();
    Json(CyclesResponse {
        count: cycles.len(),
        cycles,
    })
}
