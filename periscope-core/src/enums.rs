//! Enum types shared across Periscope crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Supported looking glass query types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// BGP route lookup for a prefix or address
    BgpRoute,
    /// BGP routes carrying a community
    BgpCommunity,
    /// BGP routes matching an AS path expression
    BgpAspath,
    /// ICMP echo from the device
    Ping,
    /// Traceroute from the device
    Traceroute,
}

impl QueryType {
    /// All query types, in display order.
    pub const ALL: [QueryType; 5] = [
        QueryType::BgpRoute,
        QueryType::BgpCommunity,
        QueryType::BgpAspath,
        QueryType::Ping,
        QueryType::Traceroute,
    ];

    /// Query types whose output can be rendered as structured data.
    pub const STRUCTURED_DEFAULT: [QueryType; 3] = [
        QueryType::BgpRoute,
        QueryType::BgpCommunity,
        QueryType::BgpAspath,
    ];

    /// Wire name of this query type.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::BgpRoute => "bgp_route",
            QueryType::BgpCommunity => "bgp_community",
            QueryType::BgpAspath => "bgp_aspath",
            QueryType::Ping => "ping",
            QueryType::Traceroute => "traceroute",
        }
    }

    /// Human-readable label, as shown in the query list.
    pub fn display_name(&self) -> &'static str {
        match self {
            QueryType::BgpRoute => "BGP Route",
            QueryType::BgpCommunity => "BGP Community",
            QueryType::BgpAspath => "BGP AS Path",
            QueryType::Ping => "Ping",
            QueryType::Traceroute => "Traceroute",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown query type: {}", s))
    }
}

// ============================================================================
// RESPONSE METADATA
// ============================================================================

/// Severity marker attached to every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Danger,
}

/// Output format negotiated for a query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ResponseFormat {
    #[serde(rename = "text/plain")]
    PlainText,
    #[serde(rename = "application/json")]
    Json,
}

impl ResponseFormat {
    /// MIME type string.
    pub fn mime(&self) -> &'static str {
        match self {
            ResponseFormat::PlainText => "text/plain",
            ResponseFormat::Json => "application/json",
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ResponseFormat::Json)
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}
