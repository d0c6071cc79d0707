//! Looking glass query model

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::identity::{compute_content_hash, Fingerprint};
use crate::QueryType;

/// Name of the VRF used when the client does not specify one.
pub const DEFAULT_VRF: &str = "default";

fn default_vrf() -> String {
    DEFAULT_VRF.to_string()
}

/// A client query as received on the wire.
///
/// The timestamp is assigned by the server on receipt and never read from
/// the request body. It is not part of the query's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Query {
    /// Name of the device to run the query on
    pub query_location: String,
    /// Query type
    pub query_type: QueryType,
    /// VRF to run the query in
    #[serde(default = "default_vrf")]
    pub query_vrf: String,
    /// Query target (prefix, address, community or AS path expression)
    pub query_target: String,
    /// Submission time
    #[serde(skip_deserializing, default = "Utc::now")]
    #[cfg_attr(feature = "openapi", schema(read_only, value_type = String, format = "date-time"))]
    pub timestamp: DateTime<Utc>,
}

impl Query {
    /// Build a query stamped with the current time.
    pub fn new(
        query_location: impl Into<String>,
        query_type: QueryType,
        query_vrf: impl Into<String>,
        query_target: impl Into<String>,
    ) -> Self {
        Self {
            query_location: query_location.into(),
            query_type,
            query_vrf: query_vrf.into(),
            query_target: query_target.into(),
            timestamp: Utc::now(),
        }
    }

    /// Replace the submission timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The fields that identify this query, as a JSON object.
    pub fn identity(&self) -> serde_json::Value {
        json!({
            "query_location": self.query_location,
            "query_type": self.query_type,
            "query_vrf": self.query_vrf,
            "query_target": self.query_target,
        })
    }

    /// Deterministic fingerprint of the query's identity.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_value(&self.identity())
    }

    /// Submission timestamp in RFC 3339 form, as stored in the cache.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Short single-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} | {} | {} | {}",
            self.query_type, self.query_location, self.query_vrf, self.query_target
        )
    }

    /// Per-call nonce mixing caller-supplied entropy with the query.
    ///
    /// Echoed back to clients so repeated identical queries can be told
    /// apart on their side.
    pub fn nonce(&self, entropy: &[u8]) -> String {
        let mut material = Vec::with_capacity(entropy.len() + 96);
        material.extend_from_slice(entropy);
        material.extend_from_slice(self.fingerprint().as_str().as_bytes());
        material.extend_from_slice(self.timestamp_string().as_bytes());
        hex::encode(compute_content_hash(&material))
    }
}
