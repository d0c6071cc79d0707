//! Periscope API - HTTP layer of the Periscope looking glass
//!
//! This crate accepts queries over REST, validates them against the instance
//! configuration, and resolves them through the query orchestrator: a
//! cache-first pipeline that runs at most one engine call per distinct query
//! while identical requests are in flight. Every accepted query is also
//! reported to an optional webhook sink from a background worker.

pub mod macros;

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod openapi;
pub mod orchestrator;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use bootstrap::{assemble, build_cache, build_engine, build_notifier, Assembled};
pub use config::{apply_env_overrides, ApiConfig};
pub use engine::{AgentEngine, EngineOutput, ExecutionEngine};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use notify::{
    NetworkInfo, NetworkLookup, NotificationDispatcher, NotificationSink, NotifyError,
    QueryNotification,
};
pub use openapi::ApiDoc;
pub use orchestrator::{Lookup, OrchestratorConfig, QueryOrchestrator, QueryResponse};
pub use routes::create_api_router;
pub use state::AppState;
pub use telemetry::{init_tracing, PeriscopeMetrics};
