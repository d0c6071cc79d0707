//! Property-Based Tests for the Query Orchestrator
//!
//! For any valid query, the first request computes and stores the output,
//! and every later request within the TTL is answered from the cache with
//! byte-identical output and the original production timestamp.
//! Failures never leave a cache entry behind.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use periscope_api::orchestrator::{Lookup, OrchestratorConfig};
use periscope_api::{ApiError, ApiResult, EngineOutput, ErrorCode, ExecutionEngine};
use periscope_core::{Severity, ValidatedQuery};
use periscope_storage::{
    CacheStore, InMemoryCacheStore, LmdbCacheStore, FORMAT_FIELD, OUTPUT_FIELD, TIMESTAMP_FIELD,
};
use periscope_test_utils::assertions::{assert_cached, assert_error_code, assert_fresh, assert_success};
use periscope_test_utils::{fixtures, generators, CountingEngine, FailingCacheStore, FailingEngine, NullEngine};
use periscope_test_utils::{QueryOrchestrator, ResponseFormat};
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// HELPERS
// ============================================================================

/// Engine whose device answers with whitespace only.
struct BlankEngine;

#[async_trait]
impl ExecutionEngine for BlankEngine {
    async fn execute(&self, _query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        Ok(Some(EngineOutput::Text("  \n".to_string())))
    }
}

/// Engine whose device stays silent for `delay`, then answers without output.
#[derive(Clone)]
struct SlowSilentEngine {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl SlowSilentEngine {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEngine for SlowSilentEngine {
    async fn execute(&self, _query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }
}

fn orchestrator_with_config(
    config: OrchestratorConfig,
    engine: Arc<dyn ExecutionEngine>,
) -> QueryOrchestrator {
    QueryOrchestrator::new(
        config,
        Arc::new(InMemoryCacheStore::new()),
        engine,
        fixtures::metrics(),
    )
}

/// Orchestrator that never produces structured output.
fn plain_orchestrator(
    cache: Arc<dyn CacheStore>,
    engine: Arc<dyn ExecutionEngine>,
) -> QueryOrchestrator {
    let config = OrchestratorConfig {
        structured_types: Vec::new(),
        ..Default::default()
    };
    QueryOrchestrator::new(config, cache, engine, fixtures::metrics())
}

/// Spawn `count` identical ping requests and collect their results.
async fn execute_concurrently(
    orchestrator: &QueryOrchestrator,
    count: usize,
) -> ApiResult<Vec<ApiResult<periscope_api::QueryResponse>>> {
    let mut handles = Vec::new();
    for _ in 0..count {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(
            handle
                .await
                .map_err(|e| ApiError::internal_error(e.to_string()))?,
        );
    }
    Ok(results)
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A repeated query is served from the cache with identical content.
    #[test]
    fn prop_second_request_is_cached(query in generators::arb_valid_query()) {
        let rt = Runtime::new().map_err(|e| TestCaseError::fail(e.to_string()))?;
        rt.block_on(async {
            let engine = CountingEngine::text();
            let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));

            let first = orchestrator
                .execute(fixtures::validated(query.clone()))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let second = orchestrator
                .execute(fixtures::validated(query.clone()))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert!(!first.cached);
            prop_assert!(second.cached);
            prop_assert_eq!(second.runtime, 0);
            prop_assert_eq!(&first.output, &second.output);
            prop_assert_eq!(&first.id, &second.id);
            prop_assert_eq!(&first.timestamp, &second.timestamp);
            prop_assert_eq!(first.format, second.format);
            prop_assert_eq!(engine.calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Distinct queries never share a cache entry.
    #[test]
    fn prop_distinct_queries_do_not_collide(
        a in generators::arb_valid_query(),
        b in generators::arb_valid_query(),
    ) {
        prop_assume!(
            (a.query_location.as_str(), a.query_type, a.query_target.as_str())
                != (b.query_location.as_str(), b.query_type, b.query_target.as_str())
        );
        let rt = Runtime::new().map_err(|e| TestCaseError::fail(e.to_string()))?;
        rt.block_on(async {
            let engine = CountingEngine::text();
            let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));

            let first = orchestrator
                .execute(fixtures::validated(a))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let second = orchestrator
                .execute(fixtures::validated(b))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_ne!(&first.id, &second.id);
            prop_assert!(!second.cached);
            prop_assert_eq!(engine.calls(), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// RESPONSE SHAPE
// ============================================================================

#[tokio::test]
async fn test_structured_device_and_type_returns_json() -> ApiResult<()> {
    let engine = CountingEngine::structured();
    let orchestrator = fixtures::orchestrator(Arc::new(engine));

    let response = orchestrator
        .execute(fixtures::validated(fixtures::bgp_route_query("192.0.2.0/24")))
        .await?;

    assert_fresh(&response);
    assert_success(&response, ResponseFormat::Json);
    assert!(response.output.is_object());
    assert_eq!(response.output["target"], "192.0.2.0/24");
    Ok(())
}

#[tokio::test]
async fn test_plain_device_returns_text() -> ApiResult<()> {
    let engine = CountingEngine::structured();
    let orchestrator = fixtures::orchestrator(Arc::new(engine));

    let query = periscope_core::Query::new(
        fixtures::PLAIN_DEVICE,
        periscope_core::QueryType::BgpRoute,
        "default",
        "192.0.2.0/24",
    );
    let response = orchestrator.execute(fixtures::validated(query)).await?;

    assert_success(&response, ResponseFormat::PlainText);
    assert!(response.output.is_string());
    Ok(())
}

#[tokio::test]
async fn test_ineligible_type_on_structured_device_returns_text() -> ApiResult<()> {
    let engine = CountingEngine::text();
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));

    let query = periscope_core::Query::new(
        fixtures::STRUCTURED_DEVICE,
        periscope_core::QueryType::Ping,
        "default",
        "192.0.2.1",
    );
    let response = orchestrator.execute(fixtures::validated(query)).await?;

    assert_success(&response, ResponseFormat::PlainText);
    assert_eq!(
        response.output,
        serde_json::Value::String("output for 192.0.2.1\nline 2".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_cache_key_uses_namespace() -> ApiResult<()> {
    let orchestrator = fixtures::orchestrator(Arc::new(CountingEngine::text()));
    let response = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    assert!(response.id.starts_with("periscope.query."));
    Ok(())
}

#[tokio::test]
async fn test_fake_output_skips_engine() -> ApiResult<()> {
    let engine = CountingEngine::text();
    let config = OrchestratorConfig {
        fake_output: true,
        ..Default::default()
    };
    let orchestrator = orchestrator_with_config(config, Arc::new(engine.clone()));

    let first = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    let second = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;

    assert_eq!(engine.calls(), 0);
    assert_fresh(&first);
    assert_cached(&second);
    assert_eq!(first.output, second.output);
    Ok(())
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_null_output_fails_with_danger_and_caches_nothing() -> ApiResult<()> {
    let engine = NullEngine::default();
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));
    let query = fixtures::validated(fixtures::ping_query("192.0.2.1"));
    let key = orchestrator.config().cache_key(&query);

    let result = orchestrator.execute(query).await;
    assert_error_code(&result, ErrorCode::ExecutionFailed);
    if let Err(err) = &result {
        assert_eq!(err.level, Severity::Danger);
        assert_eq!(err.message, orchestrator.config().messages.general);
    }

    assert_eq!(orchestrator.lookup(&key).await?, Lookup::Miss);

    let retry = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await;
    assert!(retry.is_err());
    assert_eq!(engine.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_blank_output_uses_no_output_message() -> ApiResult<()> {
    let orchestrator = fixtures::orchestrator(Arc::new(BlankEngine));
    let query = fixtures::validated(fixtures::ping_query("192.0.2.1"));
    let key = orchestrator.config().cache_key(&query);

    let result = orchestrator.execute(query).await;
    assert_error_code(&result, ErrorCode::ExecutionFailed);
    if let Err(err) = &result {
        assert_eq!(err.level, Severity::Warning);
        assert_eq!(err.message, orchestrator.config().messages.no_output);
    }
    assert_eq!(orchestrator.lookup(&key).await?, Lookup::Miss);
    Ok(())
}

#[tokio::test]
async fn test_engine_error_hides_backend_detail() -> ApiResult<()> {
    let orchestrator = fixtures::orchestrator(Arc::new(FailingEngine::unreachable()));
    let query = fixtures::validated(fixtures::ping_query("192.0.2.1"));
    let key = orchestrator.config().cache_key(&query);

    let result = orchestrator.execute(query).await;
    assert_error_code(&result, ErrorCode::BackendError);
    if let Err(err) = &result {
        assert_eq!(err.message, orchestrator.config().messages.general);
        assert!(!err.message.contains("192.0.2.254"));
    }
    assert_eq!(orchestrator.lookup(&key).await?, Lookup::Miss);
    Ok(())
}

#[tokio::test]
async fn test_engine_timeout_error_maps_to_timeout() {
    let engine = FailingEngine::new(ApiError::timeout("agent timed out"));
    let orchestrator = fixtures::orchestrator(Arc::new(engine));

    let result = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await;
    assert_error_code(&result, ErrorCode::Timeout);
    if let Err(err) = &result {
        assert_eq!(err.message, orchestrator.config().messages.request_timeout);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_engine_times_out() -> ApiResult<()> {
    let engine = CountingEngine::text().with_delay(Duration::from_secs(30));
    let config = OrchestratorConfig {
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let orchestrator = orchestrator_with_config(config, Arc::new(engine.clone()));
    let query = fixtures::validated(fixtures::ping_query("192.0.2.1"));
    let key = orchestrator.config().cache_key(&query);

    let result = orchestrator.execute(query).await;
    assert_error_code(&result, ErrorCode::Timeout);
    assert_eq!(engine.calls(), 1);
    assert_eq!(orchestrator.lookup(&key).await?, Lookup::Miss);
    Ok(())
}

// ============================================================================
// CACHE LIFECYCLE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_timeout() -> ApiResult<()> {
    let engine = CountingEngine::text();
    let config = OrchestratorConfig {
        cache_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let orchestrator = orchestrator_with_config(config, Arc::new(engine.clone()));

    orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    tokio::time::sleep(Duration::from_secs(61)).await;

    let response = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    assert_fresh(&response);
    assert_eq!(engine.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hit_refreshes_ttl() -> ApiResult<()> {
    let engine = CountingEngine::text();
    let config = OrchestratorConfig {
        cache_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let orchestrator = orchestrator_with_config(config, Arc::new(engine.clone()));

    orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(45)).await;
        let response = orchestrator
            .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
            .await?;
        assert_cached(&response);
    }
    assert_eq!(engine.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_store_still_serves() -> ApiResult<()> {
    let engine = CountingEngine::text();
    let store = FailingCacheStore::new();
    let orchestrator = fixtures::orchestrator_with(Arc::new(store.clone()), Arc::new(engine.clone()));

    let first = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;
    let second = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await?;

    assert_fresh(&first);
    assert_fresh(&second);
    assert_eq!(first.output, second.output);
    assert_eq!(engine.calls(), 2);
    assert!(store.calls() >= 2);
    assert_eq!(orchestrator.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn test_entry_in_other_format_is_recomputed() -> ApiResult<()> {
    let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
    let engine = CountingEngine::text();
    let plain = plain_orchestrator(store.clone(), Arc::new(engine.clone()));
    let structured = fixtures::orchestrator_with(store.clone(), Arc::new(engine.clone()));
    let query = || fixtures::validated(fixtures::bgp_route_query("192.0.2.0/24"));

    let first = plain.execute(query()).await?;
    assert_success(&first, ResponseFormat::PlainText);

    let fresh = structured.execute(query()).await?;
    assert_fresh(&fresh);
    assert_success(&fresh, ResponseFormat::Json);
    for _ in 0..2 {
        let response = structured.execute(query()).await?;
        assert_cached(&response);
        assert_success(&response, ResponseFormat::Json);
        assert_eq!(response.output, fresh.output);
    }
    assert_eq!(engine.calls(), 2);

    let back = plain.execute(query()).await?;
    assert_fresh(&back);
    assert_success(&back, ResponseFormat::PlainText);
    assert_eq!(back.output, first.output);
    assert_eq!(engine.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_entry_is_overwritten() -> ApiResult<()> {
    let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
    let engine = CountingEngine::structured();
    let orchestrator = fixtures::orchestrator_with(store.clone(), Arc::new(engine.clone()));
    let query = fixtures::validated(fixtures::bgp_route_query("192.0.2.0/24"));
    let key = orchestrator.config().cache_key(&query);

    store
        .put_fields(
            &key,
            &[
                (OUTPUT_FIELD, "{\"prefix\": \"192.0.2"),
                (TIMESTAMP_FIELD, "2024-01-01T00:00:00.000Z"),
                (FORMAT_FIELD, ResponseFormat::Json.mime()),
            ],
            Duration::from_secs(600),
        )
        .await?;

    let response = orchestrator.execute(query).await?;
    assert_fresh(&response);
    assert_success(&response, ResponseFormat::Json);
    assert_eq!(response.output["target"], "192.0.2.0/24");
    assert_ne!(response.timestamp, "2024-01-01T00:00:00.000Z");

    let again = orchestrator
        .execute(fixtures::validated(fixtures::bgp_route_query("192.0.2.0/24")))
        .await?;
    assert_cached(&again);
    assert_eq!(again.output, response.output);
    assert_eq!(engine.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_lmdb_entry_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = CountingEngine::structured();
    let query = || fixtures::validated(fixtures::bgp_route_query("192.0.2.0/24"));

    let first = {
        let store = LmdbCacheStore::open(dir.path(), 16)?;
        let orchestrator = fixtures::orchestrator_with(Arc::new(store), Arc::new(engine.clone()));
        orchestrator.execute(query()).await?
    };
    assert_fresh(&first);
    assert_success(&first, ResponseFormat::Json);

    let store: Arc<dyn CacheStore> = Arc::new(LmdbCacheStore::open(dir.path(), 16)?);
    let orchestrator = fixtures::orchestrator_with(store.clone(), Arc::new(engine.clone()));
    let second = orchestrator.execute(query()).await?;
    assert_cached(&second);
    assert_success(&second, ResponseFormat::Json);
    assert_eq!(second.output, first.output);
    assert_eq!(second.format, first.format);
    assert_eq!(second.timestamp, first.timestamp);
    assert_eq!(second.id, first.id);
    assert_eq!(engine.calls(), 1);

    // Same store after the device loses structured output.
    let plain = plain_orchestrator(store, Arc::new(engine.clone()));
    let third = plain.execute(query()).await?;
    assert_fresh(&third);
    assert_success(&third, ResponseFormat::PlainText);
    assert_eq!(engine.calls(), 2);
    Ok(())
}

// ============================================================================
// COALESCING
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_misses_share_one_engine_call() -> ApiResult<()> {
    let engine = CountingEngine::text().with_delay(Duration::from_millis(200));
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
                .await
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        let response = handle
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))??;
        responses.push(response);
    }

    assert_eq!(engine.calls(), 1);
    assert_eq!(responses.iter().filter(|r| !r.cached).count(), 1);
    let output = &responses[0].output;
    assert!(responses.iter().all(|r| &r.output == output));
    assert_eq!(orchestrator.in_flight(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_timeout() -> ApiResult<()> {
    let engine = CountingEngine::text().with_delay(Duration::from_secs(10));
    let config = OrchestratorConfig {
        request_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let orchestrator = orchestrator_with_config(config, Arc::new(engine.clone()));

    let start = tokio::time::Instant::now();
    let results = execute_concurrently(&orchestrator, 4).await?;
    let elapsed = start.elapsed();

    for result in &results {
        assert_error_code(result, ErrorCode::Timeout);
    }
    assert_eq!(engine.calls(), 1);
    assert!(elapsed < Duration::from_secs(2), "waited {:?}", elapsed);
    assert_eq!(orchestrator.in_flight(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_failure() -> ApiResult<()> {
    let engine = SlowSilentEngine::new(Duration::from_millis(500));
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));
    let general = orchestrator.config().messages.general.clone();

    let start = tokio::time::Instant::now();
    let results = execute_concurrently(&orchestrator, 8).await?;
    let elapsed = start.elapsed();

    for result in &results {
        assert_error_code(result, ErrorCode::ExecutionFailed);
        if let Err(err) = result {
            assert_eq!(err.message, general);
        }
    }
    assert_eq!(engine.calls(), 1);
    assert!(elapsed < Duration::from_secs(1), "waited {:?}", elapsed);
    assert_eq!(orchestrator.in_flight(), 0);

    // The shared failure is not remembered.
    let retry = orchestrator
        .execute(fixtures::validated(fixtures::ping_query("192.0.2.1")))
        .await;
    assert_error_code(&retry, ErrorCode::ExecutionFailed);
    assert_eq!(engine.calls(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_misses_run_in_parallel() -> ApiResult<()> {
    let engine = CountingEngine::text().with_delay(Duration::from_millis(100));
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));

    let mut handles = Vec::new();
    for i in 1..=8 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let target = format!("192.0.2.{}", i);
            orchestrator
                .execute(fixtures::validated(fixtures::ping_query(&target)))
                .await
        }));
    }
    for handle in handles {
        let response = handle
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))??;
        assert_fresh(&response);
    }

    assert_eq!(engine.calls(), 8);
    assert_eq!(orchestrator.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn test_abandoned_request_still_populates_cache() -> ApiResult<()> {
    let engine = CountingEngine::text().with_delay(Duration::from_millis(100));
    let orchestrator = fixtures::orchestrator(Arc::new(engine.clone()));
    let query = fixtures::validated(fixtures::ping_query("192.0.2.1"));
    let key = orchestrator.config().cache_key(&query);

    let abandoned = tokio::time::timeout(Duration::from_millis(10), orchestrator.execute(query)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(orchestrator.lookup(&key).await?, Lookup::Hit { .. }));
    assert_eq!(engine.calls(), 1);
    Ok(())
}
