//! Component assembly from an instance configuration.

use std::sync::Arc;
use std::time::Duration;

use periscope_core::{CacheBackendConfig, Config, Params};
use periscope_storage::{CacheStore, InMemoryCacheStore, LmdbCacheStore};
use tokio::task::JoinHandle;

use crate::constants::NOTIFICATION_QUEUE_CAPACITY;
use crate::engine::{AgentEngine, ExecutionEngine};
use crate::error::{ApiError, ApiResult};
use crate::notify::{BgpToolsLookup, NetworkLookup, NotificationDispatcher, WebhookSink};
use crate::orchestrator::{OrchestratorConfig, QueryOrchestrator};
use crate::state::AppState;
use crate::telemetry::PeriscopeMetrics;

/// Open the configured cache store.
pub fn build_cache(params: &Params) -> ApiResult<Arc<dyn CacheStore>> {
    match &params.cache.backend {
        CacheBackendConfig::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
        CacheBackendConfig::Lmdb { path, max_size_mb } => {
            let store = LmdbCacheStore::open(path, *max_size_mb).map_err(|e| {
                ApiError::internal_error(format!("Failed to open LMDB cache at {}: {}", path, e))
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// The engine used when synthetic output is off.
pub fn build_engine(params: &Params) -> ApiResult<Arc<dyn ExecutionEngine>> {
    // The orchestrator enforces the request timeout; the client limit only
    // has to be no shorter.
    let engine = AgentEngine::new(Duration::from_secs(params.request_timeout_secs + 1))?;
    Ok(Arc::new(engine))
}

/// Start the notification worker when a webhook is configured.
pub fn build_notifier(
    params: &Params,
    metrics: Arc<PeriscopeMetrics>,
) -> ApiResult<(NotificationDispatcher, Option<JoinHandle<()>>)> {
    let Some(hook) = &params.logging.http else {
        return Ok((NotificationDispatcher::disabled(metrics), None));
    };

    let sink = WebhookSink::new(hook.clone())
        .map_err(|e| ApiError::internal_error(format!("Failed to create webhook client: {}", e)))?;
    let lookup: Option<Arc<dyn NetworkLookup>> = if hook.network_info {
        Some(Arc::new(BgpToolsLookup::default()))
    } else {
        None
    };

    let (dispatcher, worker) =
        NotificationDispatcher::spawn(Arc::new(sink), lookup, NOTIFICATION_QUEUE_CAPACITY, metrics);
    tracing::info!(provider = hook.provider.as_str(), "Query notifications enabled");
    Ok((dispatcher, Some(worker)))
}

/// Everything `main` needs to serve.
pub struct Assembled {
    pub state: AppState,
    pub cache: Arc<dyn CacheStore>,
    pub notification_worker: Option<JoinHandle<()>>,
}

/// Build the application state from a validated configuration.
pub fn assemble(config: Config) -> ApiResult<Assembled> {
    let metrics = Arc::new(PeriscopeMetrics::new()?);
    let cache = build_cache(&config.params)?;
    let engine = build_engine(&config.params)?;
    let (notifier, notification_worker) = build_notifier(&config.params, metrics.clone())?;

    let orchestrator = QueryOrchestrator::new(
        OrchestratorConfig::from_params(&config.params),
        cache.clone(),
        engine,
        metrics.clone(),
    );

    tracing::info!(
        backend = cache.backend_name(),
        devices = config.devices.len(),
        fake_output = config.params.fake_output,
        "Components assembled"
    );

    Ok(Assembled {
        state: AppState::new(Arc::new(config), orchestrator, notifier, metrics),
        cache,
        notification_worker,
    })
}
