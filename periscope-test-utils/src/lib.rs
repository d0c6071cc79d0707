//! Periscope Test Utilities
//!
//! Centralized test infrastructure for the Periscope workspace:
//! - Mock engines, notification sinks, lookups and cache stores
//! - Test fixtures for common scenarios
//! - Proptest generators for queries and targets
//! - Custom assertions for API responses and errors

// Re-export core types for convenience
pub use periscope_api::{
    ApiError, ApiResult, EngineOutput, ErrorCode, ExecutionEngine, NetworkInfo, NetworkLookup,
    NotificationSink, NotifyError, PeriscopeMetrics, QueryNotification, QueryOrchestrator,
    QueryResponse,
};
pub use periscope_core::{
    Config, Device, Devices, Params, Query, QueryType, ResponseFormat, Severity, ValidatedQuery,
};
pub use periscope_storage::{CacheStats, CacheStore, InMemoryCacheStore, StorageError, StorageResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

// ============================================================================
// MOCK ENGINES
// ============================================================================

/// Engine that answers every query and counts its calls.
///
/// Output is derived from the query target so different queries are
/// distinguishable in assertions.
#[derive(Debug, Clone)]
pub struct CountingEngine {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    structured: bool,
}

impl CountingEngine {
    /// Plain text output.
    pub fn text() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            structured: false,
        }
    }

    /// Structured output.
    pub fn structured() -> Self {
        Self {
            structured: true,
            ..Self::text()
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `execute` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The output this engine produces for `target`.
    pub fn output_for(&self, target: &str) -> EngineOutput {
        if self.structured {
            EngineOutput::Structured(serde_json::json!({
                "target": target,
                "routes": [{"prefix": target, "as_path": [64500, 64501], "active": true}],
            }))
        } else {
            EngineOutput::Text(format!("output for {}\nline 2", target))
        }
    }
}

#[async_trait]
impl ExecutionEngine for CountingEngine {
    async fn execute(&self, query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(self.output_for(&query.query().query_target)))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Engine whose device answers without usable output.
#[derive(Debug, Clone, Default)]
pub struct NullEngine {
    calls: Arc<AtomicUsize>,
}

impl NullEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEngine for NullEngine {
    async fn execute(&self, _query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Engine that always fails with the given error.
#[derive(Debug, Clone)]
pub struct FailingEngine {
    error: ApiError,
}

impl FailingEngine {
    pub fn new(error: ApiError) -> Self {
        Self { error }
    }

    /// Fails like an unreachable device.
    pub fn unreachable() -> Self {
        Self::new(ApiError::backend_error("connection refused by 192.0.2.254"))
    }
}

#[async_trait]
impl ExecutionEngine for FailingEngine {
    async fn execute(&self, _query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        Err(self.error.clone())
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

// ============================================================================
// MOCK NOTIFICATION PIPELINE
// ============================================================================

/// Sink that keeps every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<QueryNotification>>>,
    arrived: Arc<Notify>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub async fn notifications(&self) -> Vec<QueryNotification> {
        self.received.lock().await.clone()
    }

    /// Wait until at least `count` notifications arrived or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<QueryNotification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let arrived = self.arrived.notified();
            {
                let received = self.received.lock().await;
                if received.len() >= count {
                    return received.clone();
                }
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return self.notifications().await;
            }
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &QueryNotification) -> Result<(), NotifyError> {
        self.received.lock().await.push(notification.clone());
        self.arrived.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Sink that rejects every notification.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn send(&self, _notification: &QueryNotification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Status { status: 503 })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Lookup that returns fixed metadata for every address.
#[derive(Debug, Clone, Default)]
pub struct StubLookup {
    info: NetworkInfo,
}

impl StubLookup {
    pub fn new(info: NetworkInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl NetworkLookup for StubLookup {
    async fn lookup(&self, _address: &str) -> Result<NetworkInfo, NotifyError> {
        Ok(self.info.clone())
    }
}

// ============================================================================
// MOCK CACHE STORE
// ============================================================================

/// Cache store whose backend is permanently unreachable.
#[derive(Debug, Clone, Default)]
pub struct FailingCacheStore {
    calls: Arc<AtomicUsize>,
}

impl FailingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get_field(&self, _key: &str, _field: &str) -> StorageResult<Option<String>> {
        self.fail()
    }

    async fn set_field(&self, _key: &str, _field: &str, _value: &str) -> StorageResult<()> {
        self.fail()
    }

    async fn refresh_ttl(&self, _key: &str, _ttl: Duration) -> StorageResult<bool> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> StorageResult<bool> {
        self.fail()
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        self.fail()
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        self.fail()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use periscope_api::orchestrator::OrchestratorConfig;
    use periscope_api::{AppState, NotificationDispatcher};

    /// Device with structured BGP output and the default VRF only.
    pub const STRUCTURED_DEVICE: &str = "edge1";

    /// Device with plain text output and an extra `customer` VRF.
    pub const PLAIN_DEVICE: &str = "edge2";

    /// The two fixture devices.
    pub fn devices() -> Devices {
        let mut plain = Device::new(PLAIN_DEVICE);
        plain.vrfs.push("customer".to_string());
        plain.display_name = Some("Edge 2".to_string());

        let mut structured = Device::new(STRUCTURED_DEVICE).with_structured_output(true);
        structured.display_name = Some("Edge 1".to_string());
        structured.network = Some("Frankfurt".to_string());

        match Devices::new(vec![structured, plain]) {
            Ok(devices) => devices,
            Err(e) => panic!("fixture devices invalid: {}", e),
        }
    }

    /// Default params with the fixture devices.
    pub fn config() -> Config {
        Config {
            params: Params::default(),
            devices: devices(),
        }
    }

    /// Fresh metrics registry.
    pub fn metrics() -> Arc<PeriscopeMetrics> {
        match PeriscopeMetrics::new() {
            Ok(metrics) => Arc::new(metrics),
            Err(e) => panic!("metrics registry failed: {}", e),
        }
    }

    /// Validate `query` against the fixture config.
    #[track_caller]
    pub fn validated(query: Query) -> ValidatedQuery {
        let config = config();
        match periscope_core::validate_query(query, &config.params, &config.devices) {
            Ok(validated) => validated,
            Err(e) => panic!("fixture query invalid: {}", e),
        }
    }

    /// A BGP route query on the structured device.
    pub fn bgp_route_query(target: &str) -> Query {
        Query::new(STRUCTURED_DEVICE, QueryType::BgpRoute, "default", target)
    }

    /// A ping query on the plain device.
    pub fn ping_query(target: &str) -> Query {
        Query::new(PLAIN_DEVICE, QueryType::Ping, "default", target)
    }

    /// Orchestrator over `cache` and `engine` with default params.
    pub fn orchestrator_with(
        cache: Arc<dyn CacheStore>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> QueryOrchestrator {
        QueryOrchestrator::new(OrchestratorConfig::default(), cache, engine, metrics())
    }

    /// Orchestrator over a fresh in-memory cache.
    pub fn orchestrator(engine: Arc<dyn ExecutionEngine>) -> QueryOrchestrator {
        orchestrator_with(Arc::new(InMemoryCacheStore::new()), engine)
    }

    /// Application state with notifications disabled.
    pub fn app_state(config: Config, engine: Arc<dyn ExecutionEngine>) -> AppState {
        let metrics = metrics();
        let orchestrator = QueryOrchestrator::new(
            OrchestratorConfig::from_params(&config.params),
            Arc::new(InMemoryCacheStore::new()),
            engine,
            metrics.clone(),
        );
        AppState::new(
            Arc::new(config),
            orchestrator,
            NotificationDispatcher::disabled(metrics.clone()),
            metrics,
        )
    }

    /// Application state whose notifications go to `sink`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn app_state_with_sink(
        config: Config,
        engine: Arc<dyn ExecutionEngine>,
        sink: Arc<dyn NotificationSink>,
    ) -> AppState {
        let metrics = metrics();
        let orchestrator = QueryOrchestrator::new(
            OrchestratorConfig::from_params(&config.params),
            Arc::new(InMemoryCacheStore::new()),
            engine,
            metrics.clone(),
        );
        let lookup: Arc<dyn NetworkLookup> = Arc::new(StubLookup::new(NetworkInfo {
            asn: Some(64496),
            ..Default::default()
        }));
        let (notifier, _worker) =
            NotificationDispatcher::spawn(sink, Some(lookup), 64, metrics.clone());
        AppState::new(Arc::new(config), orchestrator, notifier, metrics)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating queries.

    use super::*;
    use proptest::prelude::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    /// Generate a QueryType variant.
    pub fn arb_query_type() -> impl Strategy<Value = QueryType> {
        prop::sample::select(QueryType::ALL.to_vec())
    }

    /// Generate an IPv4 address literal.
    pub fn arb_ipv4() -> impl Strategy<Value = String> {
        any::<u32>().prop_map(|bits| Ipv4Addr::from(bits).to_string())
    }

    /// Generate an IPv6 address literal.
    pub fn arb_ipv6() -> impl Strategy<Value = String> {
        any::<u128>().prop_map(|bits| Ipv6Addr::from(bits).to_string())
    }

    /// Generate an IPv4 prefix.
    pub fn arb_ipv4_prefix() -> impl Strategy<Value = String> {
        (any::<u32>(), 0u8..=32).prop_map(|(bits, len)| format!("{}/{}", Ipv4Addr::from(bits), len))
    }

    /// Generate a standard or large community.
    pub fn arb_community() -> impl Strategy<Value = String> {
        prop_oneof![
            (any::<u16>(), any::<u16>()).prop_map(|(a, b)| format!("{}:{}", a, b)),
            (any::<u32>(), any::<u32>(), any::<u32>())
                .prop_map(|(a, b, c)| format!("{}:{}:{}", a, b, c)),
        ]
    }

    /// Generate an AS path regular expression.
    pub fn arb_aspath() -> impl Strategy<Value = String> {
        (1u32..4_200_000_000, prop::sample::select(vec!["^{}_", "_{}$", "_{}_", "^{}$"]))
            .prop_map(|(asn, pattern)| pattern.replace("{}", &asn.to_string()))
    }

    /// Generate a target valid for `query_type`.
    pub fn arb_target_for(query_type: QueryType) -> BoxedStrategy<String> {
        match query_type {
            QueryType::Ping | QueryType::Traceroute => {
                prop_oneof![arb_ipv4(), arb_ipv6()].boxed()
            }
            QueryType::BgpRoute => prop_oneof![arb_ipv4(), arb_ipv6(), arb_ipv4_prefix()].boxed(),
            QueryType::BgpCommunity => arb_community().boxed(),
            QueryType::BgpAspath => arb_aspath().boxed(),
        }
    }

    /// Generate a query that passes validation against the fixture config.
    pub fn arb_valid_query() -> impl Strategy<Value = Query> {
        (
            arb_query_type(),
            prop::sample::select(vec![fixtures::STRUCTURED_DEVICE, fixtures::PLAIN_DEVICE]),
        )
            .prop_flat_map(|(query_type, location)| {
                arb_target_for(query_type).prop_map(move |target| {
                    Query::new(location, query_type, "default", target)
                })
            })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Periscope-specific validation.

    use super::*;

    /// Assert that an ApiResult is an error with the given code.
    #[track_caller]
    pub fn assert_error_code<T: std::fmt::Debug>(result: &ApiResult<T>, code: ErrorCode) {
        match result {
            Err(err) => assert_eq!(err.code, code, "Wrong error code: {:?}", err),
            Ok(value) => panic!("Expected {:?} error, got Ok: {:?}", code, value),
        }
    }

    /// Assert that a response was served from the cache.
    #[track_caller]
    pub fn assert_cached(response: &QueryResponse) {
        assert!(response.cached, "Expected cached response: {:?}", response);
        assert_eq!(response.runtime, 0, "Cached response must report runtime 0");
    }

    /// Assert that a response was freshly computed.
    #[track_caller]
    pub fn assert_fresh(response: &QueryResponse) {
        assert!(!response.cached, "Expected fresh response: {:?}", response);
    }

    /// Assert that a response carries the expected format and a success level.
    #[track_caller]
    pub fn assert_success(response: &QueryResponse, format: ResponseFormat) {
        assert_eq!(response.format, format, "Wrong response format");
        assert_eq!(response.level, Severity::Success, "Wrong response level");
        assert!(response.keywords.is_empty(), "Success responses carry no keywords");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixture_devices() {
        let devices = fixtures::devices();
        assert_eq!(devices.len(), 2);
        let plain = devices.get(fixtures::PLAIN_DEVICE);
        assert!(plain.is_some_and(|d| d.has_vrf("customer") && !d.structured_output));
    }

    #[test]
    fn test_counting_engine_output_differs_by_target() {
        let engine = CountingEngine::text();
        assert_ne!(engine.output_for("192.0.2.1"), engine.output_for("192.0.2.2"));
        assert_eq!(engine.calls(), 0);
    }

    proptest! {
        #[test]
        fn prop_generated_queries_validate(query in generators::arb_valid_query()) {
            let config = fixtures::config();
            let result = periscope_core::validate_query(query, &config.params, &config.devices);
            prop_assert!(result.is_ok(), "{:?}", result);
        }
    }
}
