//! Read-only configuration endpoints.
//!
//! - GET /api/devices - every configured device
//! - GET /api/devices/{id} - one device
//! - GET /api/queries - enabled query types
//! - GET /api/info - instance information

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use periscope_core::{Config, DeviceExport, QueryType};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// An enabled query type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueryTypeInfo {
    pub name: QueryType,
    pub display_name: String,
    /// Whether capable devices answer this type with structured output
    pub structured: bool,
}

/// General information about this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InfoResponse {
    pub name: String,
    pub organization: String,
    pub primary_asn: u32,
    pub version: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/devices - List devices
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "Devices",
    responses(
        (status = 200, description = "Configured devices", body = Vec<DeviceExport>),
    ),
)]
pub async fn list_devices(State(config): State<Arc<Config>>) -> Json<Vec<DeviceExport>> {
    Json(config.devices.export_api())
}

/// GET /api/devices/{id} - Get one device
#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    tag = "Devices",
    params(
        ("id" = String, Path, description = "Device name")
    ),
    responses(
        (status = 200, description = "Device found", body = DeviceExport),
        (status = 404, description = "Device not found", body = ApiError),
    ),
)]
pub async fn get_device(
    State(config): State<Arc<Config>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceExport>> {
    config
        .devices
        .get(&id)
        .map(|device| Json(device.export_api()))
        .ok_or_else(|| ApiError::device_not_found(&id))
}

/// GET /api/queries - List enabled query types
#[utoipa::path(
    get,
    path = "/api/queries",
    tag = "Devices",
    responses(
        (status = 200, description = "Enabled query types", body = Vec<QueryTypeInfo>),
    ),
)]
pub async fn list_queries(State(config): State<Arc<Config>>) -> Json<Vec<QueryTypeInfo>> {
    let params = &config.params;
    let queries = params
        .queries
        .iter()
        .map(|query_type| QueryTypeInfo {
            name: *query_type,
            display_name: query_type.display_name().to_string(),
            structured: params.is_structured_type(*query_type),
        })
        .collect();
    Json(queries)
}

/// GET /api/info - Instance information
#[utoipa::path(
    get,
    path = "/api/info",
    tag = "Devices",
    responses(
        (status = 200, description = "Instance information", body = InfoResponse),
    ),
)]
pub async fn info(State(config): State<Arc<Config>>) -> Json<InfoResponse> {
    let params = &config.params;
    Json(InfoResponse {
        name: params.site_title.clone(),
        organization: params.org_name.clone(),
        primary_asn: params.primary_asn,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/:id", get(get_device))
        .route("/queries", get(list_queries))
        .route("/info", get(info))
}
