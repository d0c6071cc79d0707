//! Background Jobs for the Periscope API
//!
//! - `cache_sweeper`: purges expired cache entries
//!
//! # Usage
//!
//! ```ignore
//! use periscope_api::jobs::{cache_sweeper_task, CacheSweeperConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = CacheSweeperConfig::from_params(&params);
//! tokio::spawn(cache_sweeper_task(cache.clone(), config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_sweeper;

pub use cache_sweeper::{
    cache_sweeper_task, CacheSweeperConfig, CacheSweeperMetrics, CacheSweeperSnapshot,
};
