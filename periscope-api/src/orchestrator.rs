//! Query Orchestrator
//!
//! Cache-aside pipeline for looking glass queries:
//!
//! ```text
//! fingerprint -> cache read --hit--> refresh TTL -> envelope (cached, runtime 0)
//!                    |
//!                   miss -> join flight for key --waiter--> leader's result
//!                                |
//!                              leader -> re-read --hit--> envelope (cached)
//!                                          |
//!                                         miss -> engine -> write -> re-read -> envelope
//! ```
//!
//! Miss handling runs in its own task, so a client that disconnects drops
//! only its wait; the engine call and the cache write still complete.
//! Identical concurrent misses join one flight: the first caller runs it and
//! every caller that joined gets its result, failures included.
//!
//! An entry is served only when its stored format matches the format the
//! current configuration asks for and its output decodes. Anything else
//! reads as a miss and is overwritten.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use periscope_core::{
    Messages, Params, Query, QueryType, ResponseFormat, Severity, ValidatedQuery,
};
use periscope_storage::{
    CacheStore, StorageResult, FORMAT_FIELD, OUTPUT_FIELD, TIMESTAMP_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::constants::NONCE_ENTROPY_BYTES;
use crate::engine::{fake_output, EngineOutput, ExecutionEngine};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::telemetry::PeriscopeMetrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Settings the orchestrator reads on every request. Fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Cache key prefix
    pub namespace: String,
    /// Sliding entry lifetime
    pub cache_timeout: Duration,
    /// Upper bound on a single engine call
    pub request_timeout: Duration,
    /// Serve synthetic output instead of calling the engine
    pub fake_output: bool,
    /// Query types eligible for structured output
    pub structured_types: Vec<QueryType>,
    pub messages: Messages,
}

impl OrchestratorConfig {
    pub fn from_params(params: &Params) -> Self {
        Self {
            namespace: params.cache.namespace.clone(),
            cache_timeout: Duration::from_secs(params.cache.timeout_secs),
            request_timeout: Duration::from_secs(params.request_timeout_secs),
            fake_output: params.fake_output,
            structured_types: params.structured_types.clone(),
            messages: params.messages.clone(),
        }
    }

    /// Structured output needs both an eligible type and a capable device.
    pub fn is_structured(&self, query: &ValidatedQuery) -> bool {
        self.structured_types.contains(&query.query_type()) && query.device().structured_output
    }

    pub fn format_for(&self, query: &ValidatedQuery) -> ResponseFormat {
        if self.is_structured(query) {
            ResponseFormat::Json
        } else {
            ResponseFormat::PlainText
        }
    }

    pub fn cache_key(&self, query: &ValidatedQuery) -> String {
        query.fingerprint().cache_key(&self.namespace)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_params(&Params::default())
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Result of reading a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit {
        output: String,
        timestamp: String,
        /// MIME type the output was encoded as
        format: String,
    },
    Miss,
}

/// Response body for a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueryResponse {
    /// Command output: a string, or a JSON document for structured output
    pub output: Value,
    /// Cache key of the entry
    pub id: String,
    /// Whether the output came from the cache
    pub cached: bool,
    /// Engine runtime in whole seconds, 0 when cached
    pub runtime: u64,
    /// When the output was produced (RFC 3339)
    pub timestamp: String,
    pub format: ResponseFormat,
    /// Per-response nonce
    pub random: String,
    pub level: Severity,
    pub keywords: Vec<String>,
}

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Hit,
    Coalesced,
    Miss,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Coalesced => "coalesced",
            Outcome::Miss => "miss",
        }
    }
}

/// Decoded output ready for the envelope.
#[derive(Debug, Clone)]
struct Resolved {
    output: Value,
    format: ResponseFormat,
    timestamp: String,
    runtime: u64,
    cached: bool,
}

/// Result of one miss resolution, shared by every caller that joined it.
type Flight = Arc<OnceCell<ApiResult<Resolved>>>;

fn decode(output: String, format: ResponseFormat) -> serde_json::Result<Value> {
    match format {
        ResponseFormat::Json => serde_json::from_str(&output),
        ResponseFormat::PlainText => Ok(Value::String(output)),
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Cache-aside query pipeline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct QueryOrchestrator {
    config: Arc<OrchestratorConfig>,
    cache: Arc<dyn CacheStore>,
    engine: Arc<dyn ExecutionEngine>,
    metrics: Arc<PeriscopeMetrics>,
    in_flight: Arc<DashMap<String, Flight>>,
}

impl QueryOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        cache: Arc<dyn CacheStore>,
        engine: Arc<dyn ExecutionEngine>,
        metrics: Arc<PeriscopeMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            engine,
            metrics,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Number of keys with a miss currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Read the entry for `key`. An entry missing any field is a miss.
    pub async fn lookup(&self, key: &str) -> StorageResult<Lookup> {
        let Some(output) = self.cache.get_field(key, OUTPUT_FIELD).await? else {
            return Ok(Lookup::Miss);
        };
        let Some(timestamp) = self.cache.get_field(key, TIMESTAMP_FIELD).await? else {
            return Ok(Lookup::Miss);
        };
        match self.cache.get_field(key, FORMAT_FIELD).await? {
            Some(format) => Ok(Lookup::Hit {
                output,
                timestamp,
                format,
            }),
            None => Ok(Lookup::Miss),
        }
    }

    /// Answer a validated query from the cache or the engine.
    pub async fn execute(&self, query: ValidatedQuery) -> ApiResult<QueryResponse> {
        let query_type = query.query_type();
        let result = self.execute_inner(query).await;
        if let Err(e) = &result {
            self.metrics.record_query(query_type.as_str(), &e.code.to_string());
        }
        result
    }

    async fn execute_inner(&self, query: ValidatedQuery) -> ApiResult<QueryResponse> {
        let key = self.config.cache_key(&query);
        let format = self.config.format_for(&query);

        let cache_available = match self.read_entry(&key, format).await {
            Ok(Some(hit)) => {
                self.metrics.record_cache_lookup(true);
                tracing::debug!(cache_key = %key, "Cache hit");
                self.refresh_ttl(&key).await;
                return Ok(self.respond(query.query(), &key, hit, Outcome::Hit));
            }
            Ok(None) => {
                self.metrics.record_cache_lookup(false);
                tracing::debug!(cache_key = %key, "Cache miss");
                true
            }
            Err(e) => {
                self.metrics.record_cache_error("read");
                tracing::warn!(cache_key = %key, error = %e, "Cache read failed, bypassing cache");
                false
            }
        };

        let this = self.clone();
        let task = tokio::spawn(async move {
            this.resolve_miss(query, key, format, cache_available).await
        });

        task.await
            .map_err(|e| ApiError::internal_error(format!("Query task failed: {}", e)))?
    }

    /// Join the flight for `key`, running it if nobody else is.
    async fn resolve_miss(
        &self,
        query: ValidatedQuery,
        key: String,
        format: ResponseFormat,
        cache_available: bool,
    ) -> ApiResult<QueryResponse> {
        let flight = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut leader = false;
        let result = flight
            .get_or_init(|| {
                leader = true;
                self.resolve_flight(&query, &key, format, cache_available)
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &flight));

        let mut resolved = result?;
        let outcome = if leader && !resolved.cached {
            Outcome::Miss
        } else {
            self.metrics.record_coalesced_miss();
            tracing::debug!(cache_key = %key, "Served by concurrent request");
            resolved.cached = true;
            resolved.runtime = 0;
            Outcome::Coalesced
        };
        Ok(self.respond(query.query(), &key, resolved, outcome))
    }

    async fn resolve_flight(
        &self,
        query: &ValidatedQuery,
        key: &str,
        format: ResponseFormat,
        mut cache_available: bool,
    ) -> ApiResult<Resolved> {
        // A flight that finished just before this one may have filled the entry.
        if cache_available {
            match self.read_entry(key, format).await {
                Ok(Some(hit)) => {
                    self.refresh_ttl(key).await;
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_cache_error("read");
                    tracing::warn!(cache_key = %key, error = %e, "Cache re-read failed, bypassing cache");
                    cache_available = false;
                }
            }
        }

        self.compute(query, key, format, cache_available).await
    }

    /// Read and decode the entry for `key`. An entry stored in another
    /// format, or one that fails to decode, reads as `None`.
    async fn read_entry(
        &self,
        key: &str,
        format: ResponseFormat,
    ) -> StorageResult<Option<Resolved>> {
        let Lookup::Hit {
            output,
            timestamp,
            format: stored_format,
        } = self.lookup(key).await?
        else {
            return Ok(None);
        };

        if stored_format != format.mime() {
            self.metrics.record_cache_error("decode");
            tracing::warn!(
                cache_key = %key,
                stored = %stored_format,
                expected = %format,
                "Cached entry has a different format, recomputing"
            );
            return Ok(None);
        }

        match decode(output, format) {
            Ok(output) => Ok(Some(Resolved {
                output,
                format,
                timestamp,
                runtime: 0,
                cached: true,
            })),
            Err(e) => {
                self.metrics.record_cache_error("decode");
                tracing::warn!(cache_key = %key, error = %e, "Cached output does not decode, recomputing");
                Ok(None)
            }
        }
    }

    async fn refresh_ttl(&self, key: &str) {
        match self.cache.refresh_ttl(key, self.config.cache_timeout).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(cache_key = %key, "Entry expired before TTL refresh"),
            Err(e) => {
                self.metrics.record_cache_error("refresh");
                tracing::warn!(cache_key = %key, error = %e, "Failed to refresh cache TTL");
            }
        }
    }

    /// Run the engine and store the result when the cache is usable.
    async fn compute(
        &self,
        query: &ValidatedQuery,
        key: &str,
        format: ResponseFormat,
        cache_available: bool,
    ) -> ApiResult<Resolved> {
        let start = Instant::now();
        let (output, engine) = self.run_engine(query, format).await?;
        let elapsed = start.elapsed();

        self.metrics
            .record_engine_duration(query.query_type().as_str(), elapsed.as_secs_f64());
        tracing::info!(
            query = %query.query().summary(),
            engine,
            elapsed_secs = elapsed.as_secs_f64(),
            "Query executed"
        );

        let runtime = elapsed.as_secs_f64().round() as u64;
        let encoded = output.encode(format.is_structured())?;
        let timestamp = query.query().timestamp_string();

        if cache_available {
            if let Some(stored) = self.store(key, &encoded, &timestamp, format).await {
                return Ok(Resolved {
                    runtime,
                    cached: false,
                    ..stored
                });
            }
        }

        Ok(Resolved {
            output: decode(encoded, format)?,
            format,
            timestamp,
            runtime,
            cached: false,
        })
    }

    /// Write the entry, then read it back so the response matches what
    /// later hits serve. `None` when the store cannot provide it.
    async fn store(
        &self,
        key: &str,
        output: &str,
        timestamp: &str,
        format: ResponseFormat,
    ) -> Option<Resolved> {
        let fields = [
            (OUTPUT_FIELD, output),
            (TIMESTAMP_FIELD, timestamp),
            (FORMAT_FIELD, format.mime()),
        ];
        if let Err(e) = self
            .cache
            .put_fields(key, &fields, self.config.cache_timeout)
            .await
        {
            self.metrics.record_cache_error("write");
            tracing::warn!(cache_key = %key, error = %e, "Failed to cache query output");
            return None;
        }

        match self.read_entry(key, format).await {
            Ok(Some(stored)) => Some(stored),
            Ok(None) => {
                tracing::warn!(cache_key = %key, "Entry missing right after write");
                None
            }
            Err(e) => {
                self.metrics.record_cache_error("read");
                tracing::warn!(cache_key = %key, error = %e, "Failed to read back cached output");
                None
            }
        }
    }

    /// Produce output for `query`, along with the label of what produced it.
    async fn run_engine(
        &self,
        query: &ValidatedQuery,
        format: ResponseFormat,
    ) -> ApiResult<(EngineOutput, &'static str)> {
        if self.config.fake_output {
            return Ok((fake_output(query.query(), format.is_structured()), "fake"));
        }

        let engine = self.engine.name();
        let messages = &self.config.messages;
        match tokio::time::timeout(self.config.request_timeout, self.engine.execute(query)).await {
            Err(_) => {
                tracing::error!(
                    query = %query.query().summary(),
                    timeout_secs = self.config.request_timeout.as_secs(),
                    "Engine call timed out"
                );
                Err(ApiError::timeout(messages.request_timeout.clone()))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    query = %query.query().summary(),
                    engine,
                    error = %e,
                    "Engine call failed"
                );
                if e.code == ErrorCode::Timeout {
                    Err(ApiError::timeout(messages.request_timeout.clone()))
                } else {
                    Err(ApiError::backend_error(messages.general.clone()))
                }
            }
            Ok(Ok(None)) => {
                tracing::error!(
                    query = %query.query().summary(),
                    engine,
                    "Engine returned no output"
                );
                Err(ApiError::execution_failed(messages.general.clone()))
            }
            Ok(Ok(Some(EngineOutput::Text(text)))) if text.trim().is_empty() => {
                tracing::warn!(query = %query.query().summary(), "Engine returned empty output");
                Err(ApiError::execution_failed(messages.no_output.clone())
                    .with_level(Severity::Warning))
            }
            Ok(Ok(Some(output))) => Ok((output, engine)),
        }
    }

    fn respond(
        &self,
        query: &Query,
        key: &str,
        resolved: Resolved,
        outcome: Outcome,
    ) -> QueryResponse {
        self.metrics
            .record_query(query.query_type.as_str(), outcome.as_str());
        let entropy: [u8; NONCE_ENTROPY_BYTES] = rand::random();

        QueryResponse {
            output: resolved.output,
            id: key.to_string(),
            cached: resolved.cached,
            runtime: resolved.runtime,
            timestamp: resolved.timestamp,
            format: resolved.format,
            random: query.nonce(&entropy),
            level: Severity::Success,
            keywords: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use periscope_core::{validate_query, Device, Devices};

    fn validated(structured_device: bool, query_type: QueryType) -> ValidatedQuery {
        let devices = Devices::new(vec![
            Device::new("edge1").with_structured_output(structured_device)
        ])
        .unwrap();
        let target = match query_type {
            QueryType::BgpCommunity => "65000:100",
            QueryType::BgpAspath => "^65000_",
            _ => "192.0.2.1",
        };
        validate_query(
            Query::new("edge1", query_type, "default", target),
            &Params::default(),
            &devices,
        )
        .unwrap()
    }

    #[test]
    fn test_structured_requires_type_and_device() {
        let config = OrchestratorConfig::default();
        assert!(config.is_structured(&validated(true, QueryType::BgpRoute)));
        assert!(!config.is_structured(&validated(false, QueryType::BgpRoute)));
        assert!(!config.is_structured(&validated(true, QueryType::Ping)));
        assert!(!config.is_structured(&validated(false, QueryType::Ping)));
    }

    #[test]
    fn test_format_follows_structured_decision() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.format_for(&validated(true, QueryType::BgpRoute)), ResponseFormat::Json);
        assert_eq!(
            config.format_for(&validated(true, QueryType::Ping)),
            ResponseFormat::PlainText
        );
    }

    #[test]
    fn test_decode_by_format() {
        assert!(decode("output for 192.0.2.1".to_string(), ResponseFormat::Json).is_err());
        assert_eq!(
            decode("output for 192.0.2.1".to_string(), ResponseFormat::PlainText).ok(),
            Some(Value::String("output for 192.0.2.1".to_string()))
        );
        assert_eq!(
            decode("{\"prefix\":\"192.0.2.0/24\"}".to_string(), ResponseFormat::Json).ok(),
            Some(serde_json::json!({"prefix": "192.0.2.0/24"}))
        );
    }

    #[test]
    fn test_cache_key_uses_namespace() {
        let config = OrchestratorConfig {
            namespace: "lg".to_string(),
            ..Default::default()
        };
        let query = validated(false, QueryType::Ping);
        let key = config.cache_key(&query);
        assert!(key.starts_with("lg.query."));
        assert_eq!(key.len(), "lg.query.".len() + 64);
    }

    #[test]
    fn test_config_from_params() {
        let mut params = Params::default();
        params.cache.timeout_secs = 30;
        params.fake_output = true;
        let config = OrchestratorConfig::from_params(&params);
        assert_eq!(config.cache_timeout, Duration::from_secs(30));
        assert!(config.fake_output);
        assert_eq!(config.namespace, "periscope");
    }

    #[test]
    fn test_response_serializes_format_as_mime() -> Result<(), serde_json::Error> {
        let response = QueryResponse {
            output: serde_json::Value::String("ok".to_string()),
            id: "periscope.query.x".to_string(),
            cached: false,
            runtime: 2,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            format: ResponseFormat::PlainText,
            random: "r".to_string(),
            level: Severity::Success,
            keywords: Vec::new(),
        };
        let json = serde_json::to_value(&response)?;
        assert_eq!(json["format"], "text/plain");
        assert_eq!(json["level"], "success");
        assert_eq!(json["keywords"], serde_json::json!([]));
        Ok(())
    }
}
