//! Notification queue and background worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use periscope_core::Query;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{NetworkInfo, NetworkLookup, NotificationSink, QueryNotification};
use crate::telemetry::PeriscopeMetrics;

/// A notification waiting for network enrichment and delivery.
#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub query: Query,
    pub headers: BTreeMap<String, String>,
    pub source: String,
}

/// Handle used by request handlers to schedule notifications.
///
/// Cloning is cheap; all clones feed the same worker. When every handle is
/// dropped the worker drains the queue and exits.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<PendingNotification>>,
    metrics: Arc<PeriscopeMetrics>,
}

impl NotificationDispatcher {
    /// A dispatcher that discards everything (no sink configured).
    pub fn disabled(metrics: Arc<PeriscopeMetrics>) -> Self {
        Self { tx: None, metrics }
    }

    /// Start the worker and return the handle feeding it.
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        lookup: Option<Arc<dyn NetworkLookup>>,
        capacity: usize,
        metrics: Arc<PeriscopeMetrics>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, sink, lookup, Arc::clone(&metrics)));
        (
            Self {
                tx: Some(tx),
                metrics,
            },
            worker,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueue without waiting. Returns whether the notification was queued.
    pub fn schedule(&self, pending: PendingNotification) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(pending) {
            Ok(()) => true,
            Err(TrySendError::Full(pending)) => {
                self.metrics.record_notification("dropped");
                tracing::warn!(
                    query = %pending.query.summary(),
                    "Notification queue full, dropping notification"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_notification("dropped");
                tracing::warn!("Notification worker stopped, dropping notification");
                false
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<PendingNotification>,
    sink: Arc<dyn NotificationSink>,
    lookup: Option<Arc<dyn NetworkLookup>>,
    metrics: Arc<PeriscopeMetrics>,
) {
    tracing::info!(sink = sink.name(), "Notification worker started");
    while let Some(pending) = rx.recv().await {
        deliver(pending, sink.as_ref(), lookup.as_deref(), &metrics).await;
    }
    tracing::info!("Notification worker stopped");
}

async fn deliver(
    pending: PendingNotification,
    sink: &dyn NotificationSink,
    lookup: Option<&dyn NetworkLookup>,
    metrics: &PeriscopeMetrics,
) {
    let network = match lookup {
        Some(lookup) => lookup.lookup(&pending.source).await.unwrap_or_else(|e| {
            tracing::debug!(source = %pending.source, error = %e, "Network lookup failed");
            NetworkInfo::default()
        }),
        None => NetworkInfo::default(),
    };

    let timestamp = pending.query.timestamp;
    let notification = QueryNotification {
        query: pending.query,
        headers: pending.headers,
        source: pending.source,
        network,
        timestamp,
    };

    match sink.send(&notification).await {
        Ok(()) => metrics.record_notification("delivered"),
        Err(e) => {
            metrics.record_notification("failed");
            tracing::error!(
                sink = sink.name(),
                query = %notification.query.summary(),
                error = %e,
                "Error sending notification"
            );
        }
    }
}
