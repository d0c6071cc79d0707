//! Configuration model for a Periscope instance
//!
//! The whole instance is described by a single YAML document with two
//! top-level keys: `params` (site-wide settings) and `devices`. Every
//! setting has a default, so an empty `params` block is valid.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::Devices;
use crate::error::ConfigError;
use crate::QueryType;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default cache key namespace
pub const DEFAULT_CACHE_NAMESPACE: &str = "periscope";

/// Default cache entry lifetime in seconds
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 120;

/// Default interval between expired entry sweeps in seconds
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default LMDB map size in megabytes
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

/// Default execution timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;

/// Default webhook delivery timeout in seconds
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

fn default_site_title() -> String {
    "Periscope".to_string()
}

fn default_org_name() -> String {
    "Periscope".to_string()
}

fn default_primary_asn() -> u32 {
    65001
}

fn default_structured_types() -> Vec<QueryType> {
    QueryType::STRUCTURED_DEFAULT.to_vec()
}

fn default_queries() -> Vec<QueryType> {
    QueryType::ALL.to_vec()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

// ============================================================================
// PARAMS
// ============================================================================

/// Site-wide parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub site_title: String,
    pub org_name: String,
    pub primary_asn: u32,
    pub cache: CacheParams,
    pub messages: Messages,
    /// Serve static synthetic output instead of contacting devices
    pub fake_output: bool,
    /// Query types rendered as structured output on capable devices
    pub structured_types: Vec<QueryType>,
    /// Query types this instance accepts
    pub queries: Vec<QueryType>,
    pub request_timeout_secs: u64,
    pub logging: LoggingParams,
    pub docs: DocsParams,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            site_title: default_site_title(),
            org_name: default_org_name(),
            primary_asn: default_primary_asn(),
            cache: CacheParams::default(),
            messages: Messages::default(),
            fake_output: false,
            structured_types: default_structured_types(),
            queries: default_queries(),
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingParams::default(),
            docs: DocsParams::default(),
        }
    }
}

impl Params {
    pub fn is_enabled(&self, query_type: QueryType) -> bool {
        self.queries.contains(&query_type)
    }

    pub fn is_structured_type(&self, query_type: QueryType) -> bool {
        self.structured_types.contains(&query_type)
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Prefix for every cache key
    pub namespace: String,
    /// Entry lifetime; reset on every hit
    pub timeout_secs: u64,
    /// How often expired entries are purged
    pub sweep_interval_secs: u64,
    pub backend: CacheBackendConfig,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            timeout_secs: DEFAULT_CACHE_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            backend: CacheBackendConfig::default(),
        }
    }
}

/// Which cache store implementation to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackendConfig {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// LMDB environment on disk
    Lmdb {
        path: String,
        #[serde(default = "default_lmdb_size")]
        max_size_mb: usize,
    },
}

fn default_lmdb_size() -> usize {
    DEFAULT_LMDB_MAX_SIZE_MB
}

/// Operator-facing messages returned in failure responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Generic message for any backend failure
    pub general: String,
    /// Returned when a query completes without usable output
    pub no_output: String,
    /// Returned when a device does not answer in time
    pub request_timeout: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            general: "Something went wrong.".to_string(),
            no_output: "The query completed, but no matching results were found.".to_string(),
            request_timeout: "Request timed out.".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingParams {
    pub format: LogFormat,
    /// Webhook receiving a notification for every query
    pub http: Option<WebhookConfig>,
}

/// Webhook target formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookProvider {
    /// Plain JSON POST, signed with HMAC-SHA256 when a secret is set
    #[default]
    Generic,
    Slack,
    MsTeams,
}

impl WebhookProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProvider::Generic => "generic",
            WebhookProvider::Slack => "slack",
            WebhookProvider::MsTeams => "msteams",
        }
    }
}

/// Webhook endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub provider: WebhookProvider,
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    /// Extra headers sent with every delivery
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Enrich notifications with bgp.tools network data
    #[serde(default = "default_true")]
    pub network_info: bool,
}

fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

/// API documentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsParams {
    pub enable: bool,
    pub path: String,
    pub openapi_url: String,
}

impl Default for DocsParams {
    fn default() -> Self {
        Self {
            enable: true,
            path: "/docs".to_string(),
            openapi_url: "/api/openapi.json".to_string(),
        }
    }
}

// ============================================================================
// CONFIG DOCUMENT
// ============================================================================

/// Complete instance configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub devices: Devices,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&source)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let params = &self.params;

        if params.cache.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "params.cache.timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "cache timeout must be at least one second".to_string(),
            });
        }

        let namespace = &params.cache.namespace;
        if namespace.is_empty() || namespace.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "params.cache.namespace".to_string(),
                value: namespace.clone(),
                reason: "namespace must be non-empty and contain no whitespace".to_string(),
            });
        }

        if params.queries.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "params.queries".to_string(),
            });
        }

        if let Some(stray) = params
            .structured_types
            .iter()
            .find(|t| !params.queries.contains(t))
        {
            return Err(ConfigError::InvalidValue {
                field: "params.structured_types".to_string(),
                value: stray.to_string(),
                reason: "structured query types must also be enabled in params.queries"
                    .to_string(),
            });
        }

        if params.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "params.request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "request timeout must be at least one second".to_string(),
            });
        }

        if let Some(hook) = &params.logging.http {
            if !(hook.url.starts_with("http://") || hook.url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "params.logging.http.url".to_string(),
                    value: hook.url.clone(),
                    reason: "webhook URL must be http or https".to_string(),
                });
            }
        }

        Ok(())
    }
}
