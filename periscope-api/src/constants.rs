//! Constants for the Periscope API
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8001;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "periscope.yaml";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Capacity of the notification queue between request handlers and the worker
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 1024;

/// Webhook delivery attempts before giving up
pub const WEBHOOK_MAX_ATTEMPTS: u32 = 3;

/// Initial delay between webhook delivery attempts (doubles each retry)
pub const WEBHOOK_INITIAL_BACKOFF_MS: u64 = 500;

/// User agent sent with outbound webhook and agent requests
pub const USER_AGENT: &str = concat!("Periscope/", env!("CARGO_PKG_VERSION"));

/// Signature header for generic webhooks
pub const SIGNATURE_HEADER: &str = "X-Periscope-Signature";

/// bgp.tools whois endpoint
pub const BGP_TOOLS_WHOIS_ADDR: &str = "bgp.tools:43";

/// Timeout for a single bgp.tools lookup in seconds
pub const BGP_TOOLS_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// REQUEST HEADERS
// ============================================================================

/// Header set by reverse proxies carrying the client address
pub const HEADER_REAL_IP: &str = "x-real-ip";

/// Header listing the client address followed by intermediate proxies
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers never forwarded to notification sinks
pub const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

// ============================================================================
// RESPONSE
// ============================================================================

/// Bytes of randomness mixed into the per-response nonce
pub const NONCE_ENTROPY_BYTES: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_has_version() {
        assert!(USER_AGENT.starts_with("Periscope/"));
        assert!(USER_AGENT.len() > "Periscope/".len());
    }

    #[test]
    fn test_redacted_headers_lowercase() {
        for header in REDACTED_HEADERS {
            assert_eq!(*header, header.to_lowercase());
        }
    }
}
