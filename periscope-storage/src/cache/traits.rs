//! Cache store trait and statistics.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Field holding the serialized command output.
pub const OUTPUT_FIELD: &str = "output";

/// Field holding the logical production time of the output.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field holding the MIME type the output was encoded as.
pub const FORMAT_FIELD: &str = "format";

/// Key-value store with per-field access and explicit TTL control.
///
/// Each key maps to a small set of named string fields. A key's TTL
/// applies to all of its fields; once it elapses the whole entry is gone.
/// Keys written without a TTL never expire.
///
/// Implementations must be safe to share across tasks. No operation takes
/// a lock that spans more than one call.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read one field. Expired entries read as absent.
    async fn get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    /// Write one field, creating the entry if needed. Leaves the TTL untouched.
    async fn set_field(&self, key: &str, field: &str, value: &str) -> StorageResult<()>;

    /// Reset the entry's TTL to `ttl` from now.
    ///
    /// Returns `false` if the key does not exist (or already expired).
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> StorageResult<bool>;

    /// Write several fields and attach the TTL in one step.
    ///
    /// The default implementation issues the individual calls; stores that
    /// can do it atomically should override it.
    async fn put_fields(
        &self,
        key: &str,
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> StorageResult<()> {
        for (field, value) in fields {
            self.set_field(key, field, value).await?;
        }
        self.refresh_ttl(key, ttl).await?;
        Ok(())
    }

    /// Remove an entry. Returns whether it existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Drop every expired entry. Returns the number removed.
    async fn purge_expired(&self) -> StorageResult<u64>;

    /// Current statistics.
    async fn stats(&self) -> StorageResult<CacheStats>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of field reads that found a live entry.
    pub hits: u64,
    /// Number of field reads that found nothing.
    pub misses: u64,
    /// Number of entries currently stored (including not yet purged expired ones).
    pub entry_count: u64,
    /// Number of entries removed because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
