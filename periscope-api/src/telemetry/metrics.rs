//! Prometheus Metrics Definitions
//!
//! Every metric is registered on a registry owned by [`PeriscopeMetrics`],
//! so tests and embedded instances never collide on the process-global one.
//! Exposes a /metrics endpoint for Prometheus scraping.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Engine execution latency buckets (seconds). Device commands are slow.
const ENGINE_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 90.0];

fn register_err(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all Periscope metrics.
#[derive(Clone)]
pub struct PeriscopeMetrics {
    registry: Registry,

    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Query counter - labels: query_type, outcome
    pub queries_total: CounterVec,

    /// Cache lookups that found a live entry
    pub cache_hits_total: IntCounter,

    /// Cache lookups that found nothing
    pub cache_misses_total: IntCounter,

    /// Misses served from an entry written by a concurrent identical request
    pub coalesced_misses_total: IntCounter,

    /// Cache operations that failed - labels: operation
    pub cache_errors_total: CounterVec,

    /// Engine execution duration histogram - labels: query_type
    pub engine_duration_seconds: HistogramVec,

    /// Notification counter - labels: outcome (delivered/failed/dropped)
    pub notifications_total: CounterVec,
}

impl PeriscopeMetrics {
    /// Create all metrics and register them on a fresh registry.
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new_custom(Some("periscope".to_string()), None)
            .map_err(|e| register_err("registry", e))?;

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .map_err(|e| register_err("http_requests_total", e))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .map_err(|e| register_err("http_request_duration_seconds", e))?;

        let queries_total = CounterVec::new(
            Opts::new("queries_total", "Total number of looking glass queries"),
            &["query_type", "outcome"],
        )
        .map_err(|e| register_err("queries_total", e))?;

        let cache_hits_total = IntCounter::new("cache_hits_total", "Cache lookups served from cache")
            .map_err(|e| register_err("cache_hits_total", e))?;

        let cache_misses_total =
            IntCounter::new("cache_misses_total", "Cache lookups that found no entry")
                .map_err(|e| register_err("cache_misses_total", e))?;

        let coalesced_misses_total = IntCounter::new(
            "coalesced_misses_total",
            "Misses answered by a concurrent identical request",
        )
        .map_err(|e| register_err("coalesced_misses_total", e))?;

        let cache_errors_total = CounterVec::new(
            Opts::new("cache_errors_total", "Cache store operations that failed"),
            &["operation"],
        )
        .map_err(|e| register_err("cache_errors_total", e))?;

        let engine_duration_seconds = HistogramVec::new(
            HistogramOpts::new("engine_duration_seconds", "Engine execution time in seconds")
                .buckets(ENGINE_LATENCY_BUCKETS.to_vec()),
            &["query_type"],
        )
        .map_err(|e| register_err("engine_duration_seconds", e))?;

        let notifications_total = CounterVec::new(
            Opts::new("notifications_total", "Query notifications by outcome"),
            &["outcome"],
        )
        .map_err(|e| register_err("notifications_total", e))?;

        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(|e| register_err("http_requests_total", e))?;
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .map_err(|e| register_err("http_request_duration_seconds", e))?;
        registry
            .register(Box::new(queries_total.clone()))
            .map_err(|e| register_err("queries_total", e))?;
        registry
            .register(Box::new(cache_hits_total.clone()))
            .map_err(|e| register_err("cache_hits_total", e))?;
        registry
            .register(Box::new(cache_misses_total.clone()))
            .map_err(|e| register_err("cache_misses_total", e))?;
        registry
            .register(Box::new(coalesced_misses_total.clone()))
            .map_err(|e| register_err("coalesced_misses_total", e))?;
        registry
            .register(Box::new(cache_errors_total.clone()))
            .map_err(|e| register_err("cache_errors_total", e))?;
        registry
            .register(Box::new(engine_duration_seconds.clone()))
            .map_err(|e| register_err("engine_duration_seconds", e))?;
        registry
            .register(Box::new(notifications_total.clone()))
            .map_err(|e| register_err("notifications_total", e))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            queries_total,
            cache_hits_total,
            cache_misses_total,
            coalesced_misses_total,
            cache_errors_total,
            engine_duration_seconds,
            notifications_total,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a finished query. `outcome` is `hit`, `miss` or an error code.
    pub fn record_query(&self, query_type: &str, outcome: &str) {
        self.queries_total
            .with_label_values(&[query_type, outcome])
            .inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits_total.inc();
        } else {
            self.cache_misses_total.inc();
        }
    }

    pub fn record_coalesced_miss(&self) {
        self.coalesced_misses_total.inc();
    }

    pub fn record_cache_error(&self, operation: &str) {
        self.cache_errors_total.with_label_values(&[operation]).inc();
    }

    pub fn record_engine_duration(&self, query_type: &str, duration_secs: f64) {
        self.engine_duration_seconds
            .with_label_values(&[query_type])
            .observe(duration_secs);
    }

    /// Record a notification outcome: `delivered`, `failed` or `dropped`.
    pub fn record_notification(&self, outcome: &str) {
        self.notifications_total.with_label_values(&[outcome]).inc();
    }

    /// Encode every registered metric in Prometheus text format.
    pub fn encode(&self) -> ApiResult<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler(State(metrics): State<Arc<PeriscopeMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.message.into_bytes(),
            )
        }
    }
}
