//! OpenAPI Specification for the Periscope API
//!
//! Generated from Rust types and route annotations with utoipa.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::orchestrator::QueryResponse;
use crate::routes::devices::{self, InfoResponse, QueryTypeInfo};
use crate::routes::health::{self, ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::query;
use crate::telemetry::metrics;

use periscope_core::{DeviceExport, Query, QueryType, ResponseFormat, Severity};

/// OpenAPI document for the Periscope API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Periscope API",
        version = "0.1.0",
        description = "Network looking glass: run BGP, ping and traceroute queries on configured devices",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8001", description = "Local Development")
    ),
    tags(
        (name = "Query", description = "Looking glass query execution"),
        (name = "Devices", description = "Configured devices, query types and instance information"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        query::submit_query,
        devices::list_devices,
        devices::get_device,
        devices::list_queries,
        devices::info,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            Query,
            QueryType,
            QueryResponse,
            ResponseFormat,
            Severity,
            DeviceExport,
            QueryTypeInfo,
            InfoResponse,
            ApiError,
            ErrorCode,
            HealthResponse,
            HealthStatus,
            HealthDetails,
            ComponentHealth,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        let openapi = Self::openapi();
        serde_json::to_string_pretty(&openapi)
    }

    /// Generate OpenAPI spec as YAML string.
    #[cfg(feature = "openapi")]
    pub fn to_yaml() -> Result<String, String> {
        let openapi = Self::openapi();
        serde_yaml::to_string(&openapi).map_err(|e| e.to_string())
    }
}
