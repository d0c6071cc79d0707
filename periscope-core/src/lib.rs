//! Periscope Core - Data Model
//!
//! Query, device and configuration types shared by every Periscope crate,
//! plus the deterministic query fingerprint used as the cache identity.
//! No I/O beyond reading the configuration file.

pub mod config;
pub mod device;
pub mod enums;
pub mod error;
pub mod identity;
pub mod query;
pub mod validation;

pub use config::{
    CacheBackendConfig, CacheParams, Config, DocsParams, LogFormat, LoggingParams, Messages,
    Params, WebhookConfig, WebhookProvider,
};
pub use device::{Device, DeviceExport, Devices};
pub use enums::{QueryType, ResponseFormat, Severity};
pub use error::{ConfigError, PeriscopeError, PeriscopeResult, ValidationError};
pub use identity::{canonical_json, compute_content_hash, ContentHash, Fingerprint};
pub use query::{Query, DEFAULT_VRF};
pub use validation::{validate_query, validate_target, ValidatedQuery};
