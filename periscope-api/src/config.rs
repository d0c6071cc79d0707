//! API Configuration Module
//!
//! Process-level settings (listen address, CORS, where the instance
//! configuration lives) come from environment variables. A few instance
//! parameters may also be overridden from the environment after the YAML
//! document is loaded.

use std::net::{IpAddr, SocketAddr};

use periscope_core::{Config, ConfigError, LogFormat};

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CONFIG_PATH, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// TCP port.
    pub port: u16,

    /// Path of the YAML instance configuration.
    pub config_path: String,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PERISCOPE_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PERISCOPE_API_PORT`, then `PORT`: Listen port (default: 8001)
    /// - `PERISCOPE_CONFIG`: Instance configuration file (default: periscope.yaml)
    /// - `PERISCOPE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `PERISCOPE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `PERISCOPE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let bind_host = std::env::var("PERISCOPE_API_BIND")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let port = std::env::var("PERISCOPE_API_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let config_path = std::env::var("PERISCOPE_CONFIG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let cors_origins = std::env::var("PERISCOPE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("PERISCOPE_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let cors_max_age_secs = std::env::var("PERISCOPE_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CORS_MAX_AGE_SECS);

        Self {
            bind_host,
            port,
            config_path,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_host
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "PERISCOPE_API_BIND".to_string(),
                value: self.bind_host.clone(),
                reason: "expected an IP address".to_string(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

// ============================================================================
// INSTANCE OVERRIDES
// ============================================================================

/// Apply environment overrides to a loaded instance configuration.
///
/// - `PERISCOPE_CACHE_TIMEOUT_SECS`: cache entry lifetime
/// - `PERISCOPE_FAKE_OUTPUT`: "true"/"1" to serve synthetic output
/// - `PERISCOPE_LOG_FORMAT`: "json" or "pretty"
///
/// The result is validated again, so an override cannot produce a
/// configuration the file itself could not.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// [`apply_env_overrides`] with an injectable variable source.
pub fn apply_overrides<F>(config: &mut Config, var: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var("PERISCOPE_CACHE_TIMEOUT_SECS") {
        config.params.cache.timeout_secs =
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "PERISCOPE_CACHE_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
                reason: "expected a whole number of seconds".to_string(),
            })?;
    }

    if let Some(raw) = var("PERISCOPE_FAKE_OUTPUT") {
        let raw = raw.trim().to_lowercase();
        config.params.fake_output = raw == "true" || raw == "1";
    }

    if let Some(raw) = var("PERISCOPE_LOG_FORMAT") {
        config.params.logging.format = match raw.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "PERISCOPE_LOG_FORMAT".to_string(),
                    value: raw,
                    reason: "expected json or pretty".to_string(),
                })
            }
        };
    }

    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert_eq!(config.port, 8001);
        assert_eq!(config.config_path, "periscope.yaml");
    }

    #[test]
    fn test_bind_addr() -> Result<(), ConfigError> {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.bind_addr()?, SocketAddr::from(([127, 0, 0, 1], 9000)));

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.example"));

        config.cors_origins = vec!["https://lg.example.net".to_string()];
        assert!(config.is_origin_allowed("https://lg.example.net"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }

    #[test]
    fn test_overrides_applied() -> Result<(), ConfigError> {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            vars(&[
                ("PERISCOPE_CACHE_TIMEOUT_SECS", "15"),
                ("PERISCOPE_FAKE_OUTPUT", "1"),
                ("PERISCOPE_LOG_FORMAT", "JSON"),
            ]),
        )?;
        assert_eq!(config.params.cache.timeout_secs, 15);
        assert!(config.params.fake_output);
        assert_eq!(config.params.logging.format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn test_overrides_revalidated() {
        let mut config = Config::default();
        let result = apply_overrides(&mut config, vars(&[("PERISCOPE_CACHE_TIMEOUT_SECS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let mut config = Config::default();
        let result = apply_overrides(&mut config, vars(&[("PERISCOPE_LOG_FORMAT", "xml")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_no_overrides_is_noop() -> Result<(), ConfigError> {
        let mut config = Config::default();
        apply_overrides(&mut config, vars(&[]))?;
        assert_eq!(config, Config::default());
        Ok(())
    }
}
