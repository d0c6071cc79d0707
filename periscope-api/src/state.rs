//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use periscope_core::Config;

use crate::notify::NotificationDispatcher;
use crate::orchestrator::QueryOrchestrator;
use crate::telemetry::PeriscopeMetrics;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Instance configuration (params and devices), read-only after startup.
    pub config: Arc<Config>,
    pub orchestrator: QueryOrchestrator,
    pub notifier: NotificationDispatcher,
    pub metrics: Arc<PeriscopeMetrics>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        orchestrator: QueryOrchestrator,
        notifier: NotificationDispatcher,
        metrics: Arc<PeriscopeMetrics>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            notifier,
            metrics,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<Config>, config);
crate::impl_from_ref!(QueryOrchestrator, orchestrator);
crate::impl_from_ref!(NotificationDispatcher, notifier);
crate::impl_from_ref!(Arc<PeriscopeMetrics>, metrics);
crate::impl_from_ref!(Instant, start_time);
