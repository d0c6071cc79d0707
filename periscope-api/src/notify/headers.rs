//! Request header processing for notifications.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::constants::{HEADER_FORWARDED_FOR, HEADER_REAL_IP, REDACTED_HEADERS};

/// Flatten request headers into a lowercase name/value map.
///
/// Credentials are dropped and non-UTF-8 values skipped. Repeated headers
/// are joined with `", "`.
pub fn process_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if REDACTED_HEADERS.contains(&name) {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

/// Client address: `x-real-ip`, then the first `x-forwarded-for` entry,
/// then the TCP peer. `"unknown"` when none is available.
pub fn source_address(headers: &BTreeMap<String, String>, peer: Option<SocketAddr>) -> String {
    let from_header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    from_header(HEADER_REAL_IP)
        .or_else(|| from_header(HEADER_FORWARDED_FOR))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
