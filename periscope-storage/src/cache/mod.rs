//! Query result cache stores.
//!
//! The orchestrator talks to the cache only through [`CacheStore`]: a
//! keyed hash of string fields with a per-key TTL that callers slide
//! forward on every hit. Two stores ship with the crate:
//!
//! - [`InMemoryCacheStore`] for a single process (the default)
//! - [`LmdbCacheStore`] for a cache that survives restarts

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore, FORMAT_FIELD, OUTPUT_FIELD, TIMESTAMP_FIELD};
