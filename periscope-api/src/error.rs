//! Error Types for the Periscope API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with an HTTP status code, a severity
//! `level` the UI uses to colour the alert, and a (usually empty) list of
//! `keywords` to highlight in the message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use periscope_core::{ConfigError, Severity, ValidationError};
use periscope_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and a default
/// severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request body could not be parsed
    InvalidInput,

    /// Query type is not enabled on this instance
    QueryTypeDisabled,

    /// Query target is malformed for its query type
    InvalidTarget,

    /// VRF is not configured on the selected device
    VrfNotFound,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested device does not exist
    DeviceNotFound,

    // ========================================================================
    // Upstream Errors (502, 504)
    // ========================================================================
    /// Execution completed without usable output
    ExecutionFailed,

    /// Execution engine raised an error
    BackendError,

    /// Execution did not finish in time
    Timeout,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// A dependency is temporarily unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput
            | ErrorCode::QueryTypeDisabled
            | ErrorCode::InvalidTarget
            | ErrorCode::VrfNotFound => StatusCode::BAD_REQUEST,

            ErrorCode::DeviceNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ExecutionFailed | ErrorCode::BackendError => StatusCode::BAD_GATEWAY,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default severity for this error code.
    pub fn default_level(&self) -> Severity {
        match self {
            ErrorCode::InvalidInput
            | ErrorCode::QueryTypeDisabled
            | ErrorCode::InvalidTarget
            | ErrorCode::VrfNotFound
            | ErrorCode::DeviceNotFound => Severity::Warning,

            ErrorCode::ExecutionFailed | ErrorCode::BackendError | ErrorCode::Timeout => {
                Severity::Danger
            }

            ErrorCode::InternalError | ErrorCode::ServiceUnavailable => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Alert severity for the client
    pub level: Severity,

    /// Words in `message` the client should highlight
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ApiError {
    /// Create a new API error with the code's default severity.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            level: code.default_level(),
            keywords: Vec::new(),
        }
    }

    /// Override the severity.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Mark words to highlight.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a DeviceNotFound error.
    pub fn device_not_found(name: &str) -> Self {
        Self::new(ErrorCode::DeviceNotFound, format!("Device {} not found", name))
            .with_keywords([name])
    }

    /// Create an ExecutionFailed error carrying the operator's message.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message)
    }

    /// Create a BackendError.
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendError, message)
    }

    /// Create a Timeout error carrying the operator's message.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling in Axum.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::DeviceNotFound { name } => ApiError::device_not_found(name),
            ValidationError::QueryTypeDisabled { query_type } => {
                ApiError::new(ErrorCode::QueryTypeDisabled, err.to_string())
                    .with_keywords([query_type.as_str()])
            }
            ValidationError::VrfNotFound { vrf, .. } => {
                ApiError::new(ErrorCode::VrfNotFound, err.to_string()).with_keywords([vrf.as_str()])
            }
            ValidationError::InvalidTarget { .. } => {
                ApiError::new(ErrorCode::InvalidTarget, err.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        ApiError::internal_error(err.to_string())
    }
}

/// Storage failures surface only where the store is the operation itself
/// (health checks); the query path degrades to a miss instead.
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Cache store error");
        ApiError::service_unavailable("Cache store unavailable")
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::internal_error(format!("Serialization failed: {}", err))
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
