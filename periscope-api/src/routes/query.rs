//! Query endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use periscope_core::{validate_query, Config, Query};

use crate::error::{ApiError, ApiResult};
use crate::notify::{process_headers, source_address, NotificationDispatcher, PendingNotification};
use crate::orchestrator::{QueryOrchestrator, QueryResponse};
use crate::state::AppState;

/// POST /api/query - Run a looking glass query
///
/// Every accepted request body is reported to the notification sink, even
/// when validation or execution fails afterwards.
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "Query",
    request_body = Query,
    responses(
        (status = 200, description = "Query output", body = QueryResponse),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 404, description = "Device not found", body = ApiError),
        (status = 502, description = "Device returned no usable output", body = ApiError),
        (status = 504, description = "Device did not answer in time", body = ApiError),
    ),
)]
pub async fn submit_query(
    State(config): State<Arc<Config>>,
    State(orchestrator): State<QueryOrchestrator>,
    State(notifier): State<NotificationDispatcher>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<Query>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(query) = payload?;
    tracing::info!(query = %query.summary(), "Starting query execution");

    if notifier.is_enabled() {
        let headers = process_headers(&headers);
        let source = source_address(&headers, peer.map(|ConnectInfo(addr)| addr));
        notifier.schedule(PendingNotification {
            query: query.clone(),
            headers,
            source,
        });
    }

    let validated = validate_query(query, &config.params, &config.devices)?;
    let summary = validated.query().summary();
    let response = orchestrator.execute(validated).await?;

    tracing::info!(
        query = %summary,
        cached = response.cached,
        runtime = response.runtime,
        "Completed query execution"
    );
    Ok(Json(response))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/query", post(submit_query))
}
