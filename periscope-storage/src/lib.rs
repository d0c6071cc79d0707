//! Periscope Storage - cache stores for query results

pub mod cache;
pub mod error;

pub use cache::{
    CacheStats, CacheStore, InMemoryCacheStore, LmdbCacheError, LmdbCacheStore, FORMAT_FIELD,
    OUTPUT_FIELD, TIMESTAMP_FIELD,
};
pub use error::{StorageError, StorageResult};
