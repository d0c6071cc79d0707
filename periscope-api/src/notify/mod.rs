//! Query notifications.
//!
//! Every query is reported to an external observer (a webhook) together
//! with the request headers, the client address and network metadata for
//! that address. Delivery is best effort: request handlers only enqueue,
//! and a single background worker performs the lookup and the delivery.
//! Nothing that happens here can change a query response.
//!
//! ```text
//! handler --try_send--> [queue] --> worker --lookup--> bgp.tools
//!                                         \--send----> NotificationSink
//! ```

pub mod bgptools;
pub mod dispatcher;
pub mod headers;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use periscope_core::Query;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use bgptools::BgpToolsLookup;
pub use dispatcher::{NotificationDispatcher, PendingNotification};
pub use headers::{process_headers, source_address};
pub use webhook::WebhookSink;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while building or delivering a notification.
///
/// These are logged by the worker and never reach a client.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP delivery failed: {0}")]
    Http(String),

    #[error("Receiver rejected notification with status {status}")]
    Status { status: u16 },

    #[error("Failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to sign notification: {0}")]
    Signing(String),

    #[error("Network lookup failed for {address}: {reason}")]
    Lookup { address: String, reason: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Http(err.to_string())
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

/// Network metadata for a client address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl NetworkInfo {
    pub fn is_empty(&self) -> bool {
        *self == NetworkInfo::default()
    }
}

/// Everything reported for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryNotification {
    pub query: Query,
    pub headers: BTreeMap<String, String>,
    pub source: String,
    pub network: NetworkInfo,
    pub timestamp: DateTime<Utc>,
}

impl QueryNotification {
    /// Human-readable name/value pairs for chat-style receivers.
    pub fn facts(&self) -> Vec<(&'static str, String)> {
        let mut facts = vec![
            ("Query Location", self.query.query_location.clone()),
            ("Query Type", self.query.query_type.display_name().to_string()),
            ("Query VRF", self.query.query_vrf.clone()),
            ("Query Target", self.query.query_target.clone()),
            ("Source", self.source.clone()),
        ];
        if let Some(asn) = self.network.asn {
            facts.push(("Source ASN", format!("AS{}", asn)));
        }
        if let Some(prefix) = &self.network.prefix {
            facts.push(("Source Prefix", prefix.clone()));
        }
        if let Some(org) = &self.network.org {
            facts.push(("Source Organization", org.clone()));
        }
        if let Some(country) = &self.network.country {
            facts.push(("Source Country", country.clone()));
        }
        if let Some(agent) = self.headers.get("user-agent") {
            facts.push(("User Agent", agent.clone()));
        }
        facts.push(("Timestamp", self.timestamp.to_rfc3339()));
        facts
    }
}

// ============================================================================
// SEAMS
// ============================================================================

/// Receiver of query notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &QueryNotification) -> Result<(), NotifyError>;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Source of network metadata for client addresses.
#[async_trait]
pub trait NetworkLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<NetworkInfo, NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use periscope_core::QueryType;

    fn notification() -> QueryNotification {
        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), "curl/8.0".to_string());
        QueryNotification {
            query: Query::new("edge1", QueryType::BgpRoute, "default", "192.0.2.0/24"),
            headers,
            source: "203.0.113.7".to_string(),
            network: NetworkInfo {
                asn: Some(64500),
                org: Some("Example Networks".to_string()),
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_facts_include_network_and_agent() {
        let facts = notification().facts();
        let names: Vec<&str> = facts.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"Source ASN"));
        assert!(names.contains(&"Source Organization"));
        assert!(names.contains(&"User Agent"));
        assert!(!names.contains(&"Source Prefix"));
        assert!(facts.contains(&("Source ASN", "AS64500".to_string())));
    }

    #[test]
    fn test_empty_network_info_serializes_to_empty_object() -> Result<(), serde_json::Error> {
        let info = NetworkInfo::default();
        assert!(info.is_empty());
        assert_eq!(serde_json::to_value(&info)?, serde_json::json!({}));
        Ok(())
    }
}
