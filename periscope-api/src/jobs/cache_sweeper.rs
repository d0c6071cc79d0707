//! Cache Sweeper Background Task
//!
//! Stores drop expired entries lazily, when they are next touched. Keys
//! that are never queried again would otherwise stay on disk (LMDB) or in
//! memory indefinitely, so this task purges them on a fixed interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use periscope_core::Params;
use periscope_storage::CacheStore;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cache sweeper.
#[derive(Debug, Clone)]
pub struct CacheSweeperConfig {
    /// How often to purge expired entries
    pub sweep_interval: Duration,

    /// Whether to log sweeps that removed something (default: true)
    pub log_purges: bool,
}

impl Default for CacheSweeperConfig {
    fn default() -> Self {
        Self::from_params(&Params::default())
    }
}

impl CacheSweeperConfig {
    pub fn from_params(params: &Params) -> Self {
        Self {
            sweep_interval: Duration::from_secs(params.cache.sweep_interval_secs.max(1)),
            log_purges: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweeper activity.
#[derive(Debug, Default)]
pub struct CacheSweeperMetrics {
    /// Total entries purged since startup
    pub entries_purged: AtomicU64,

    /// Total sweep cycles completed
    pub sweep_cycles: AtomicU64,

    /// Total sweeps that failed
    pub sweep_errors: AtomicU64,
}

impl CacheSweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CacheSweeperSnapshot {
        CacheSweeperSnapshot {
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweeper metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSweeperSnapshot {
    pub entries_purged: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Purge expired entries every `sweep_interval` until shutdown is signalled.
///
/// Returns the metrics collected over the task's lifetime.
pub async fn cache_sweeper_task(
    cache: Arc<dyn CacheStore>,
    config: CacheSweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweeperMetrics> {
    let metrics = Arc::new(CacheSweeperMetrics::new());

    let mut sweep_interval = interval(config.sweep_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; nothing can have expired yet.
    sweep_interval.tick().await;

    tracing::info!(
        backend = cache.backend_name(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Cache sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweeper shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep(cache.as_ref(), &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        entries_purged = snapshot.entries_purged,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Cache sweeper completed"
    );

    metrics
}

/// Perform one sweep.
async fn sweep(cache: &dyn CacheStore, config: &CacheSweeperConfig, metrics: &CacheSweeperMetrics) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    match cache.purge_expired().await {
        Ok(0) => tracing::trace!("Cache sweep found nothing to purge"),
        Ok(purged) => {
            metrics.entries_purged.fetch_add(purged, Ordering::Relaxed);
            if config.log_purges {
                tracing::info!(purged, backend = cache.backend_name(), "Purged expired cache entries");
            }
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Cache sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use periscope_storage::InMemoryCacheStore;

    #[test]
    fn test_config_from_params() {
        let mut params = Params::default();
        params.cache.sweep_interval_secs = 5;
        let config = CacheSweeperConfig::from_params(&params);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));

        params.cache.sweep_interval_secs = 0;
        let config = CacheSweeperConfig::from_params(&params);
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = CacheSweeperMetrics::new();
        metrics.entries_purged.fetch_add(3, Ordering::Relaxed);
        metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
        assert_eq!(
            metrics.snapshot(),
            CacheSweeperSnapshot {
                entries_purged: 3,
                sweep_cycles: 1,
                sweep_errors: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() -> Result<(), periscope_storage::StorageError> {
        let store = Arc::new(InMemoryCacheStore::new());
        store
            .put_fields("k1", &[("output", "a")], Duration::from_secs(5))
            .await?;
        store
            .put_fields("k2", &[("output", "b")], Duration::from_secs(500))
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = CacheSweeperConfig {
            sweep_interval: Duration::from_secs(10),
            log_purges: false,
        };
        let handle = tokio::spawn(cache_sweeper_task(store.clone(), config, shutdown_rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        let _ = shutdown_tx.send(true);
        let metrics = handle
            .await
            .map_err(|e| periscope_storage::StorageError::Unavailable {
                reason: e.to_string(),
            })?;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.entries_purged, 1);
        assert!(snapshot.sweep_cycles >= 2);
        assert_eq!(store.stats().await?.entry_count, 1);
        Ok(())
    }
}
