//! Error types for Periscope operations

use thiserror::Error;

use crate::QueryType;

/// Query validation errors.
///
/// These surface to clients as `warning`-level responses: the request was
/// malformed or refers to something this instance does not serve.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("Query type {query_type} is not enabled")]
    QueryTypeDisabled { query_type: QueryType },

    #[error("VRF {vrf} is not configured on device {device}")]
    VrfNotFound { device: String, vrf: String },

    #[error("Invalid target for {query_type}: {reason}")]
    InvalidTarget { query_type: QueryType, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate device name: {name}")]
    DuplicateDevice { name: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            reason: err.to_string(),
        }
    }
}

/// Master error type for all Periscope core errors.
#[derive(Debug, Clone, Error)]
pub enum PeriscopeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Periscope core operations.
pub type PeriscopeResult<T> = Result<T, PeriscopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_device_not_found() {
        let err = ValidationError::DeviceNotFound {
            name: "edge1.fra".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Device not found"));
        assert!(msg.contains("edge1.fra"));
    }

    #[test]
    fn test_validation_error_display_disabled_type() {
        let err = ValidationError::QueryTypeDisabled {
            query_type: QueryType::Traceroute,
        };
        assert!(err.to_string().contains("traceroute"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "cache.timeout_secs".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cache.timeout_secs"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_master_error_from_config() {
        let err: PeriscopeError = ConfigError::DuplicateDevice {
            name: "r1".to_string(),
        }
        .into();
        assert!(matches!(err, PeriscopeError::Config(_)));
        assert!(err.to_string().starts_with("Config error"));
    }
}
