//! REST API Routes Module
//!
//! Includes:
//! - The query endpoint (`POST /api/query`)
//! - Read-only configuration endpoints under `/api`
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics
//! - OpenAPI document and, with the `swagger-ui` feature, Swagger UI
//! - CORS support for browser-based clients

pub mod devices;
pub mod health;
pub mod query;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Handler for the OpenAPI JSON document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Handler for /api/openapi.yaml endpoint.
#[cfg(feature = "openapi")]
async fn openapi_yaml() -> impl IntoResponse {
    use axum::http::StatusCode;

    match ApiDoc::to_yaml() {
        Ok(yaml) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/yaml")], yaml),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("Failed to generate YAML: {}", e),
        ),
    }
}

/// Build the CORS layer.
///
/// With no configured origins every origin is allowed; otherwise only the
/// listed ones are.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete API router.
///
/// - `POST /api/query`
/// - `GET /api/devices`, `/api/devices/{id}`, `/api/queries`, `/api/info`
/// - `GET /health/{ping,live,ready}`
/// - `GET /metrics`
/// - OpenAPI JSON at `docs.openapi_url`, YAML at `/api/openapi.yaml`
/// - Swagger UI at `docs.path` when `docs.enable` is set and the
///   `swagger-ui` feature is compiled in
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    let docs = state.config.params.docs.clone();

    let api_routes = Router::new()
        .merge(query::create_router())
        .merge(devices::create_router());

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route(&docs.openapi_url, get(openapi_json));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/api/openapi.yaml", get(openapi_yaml));
    }

    #[cfg(feature = "swagger-ui")]
    {
        if docs.enable {
            use utoipa_swagger_ui::SwaggerUi;

            match serde_json::to_value(ApiDoc::openapi()) {
                Ok(document) => {
                    router = router.merge(
                        SwaggerUi::new(docs.path.clone())
                            .external_url_unchecked(docs.openapi_url.clone(), document),
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to render OpenAPI document, docs disabled")
                }
            }
        }
    }

    let cors = build_cors_layer(api_config);
    let metrics = state.metrics.clone();

    router
        .with_state(state)
        .layer(from_fn_with_state(metrics, observability_middleware))
        .layer(cors)
}
