//! Process-local cache store.
//!
//! Entries live in a `HashMap` behind a tokio `RwLock`. Expiry uses
//! `tokio::time::Instant`, so tests can drive the clock with
//! `tokio::time::pause` and `advance`.
//!
//! Expired entries read as absent immediately; they are physically removed
//! by the next write to the same key or by [`CacheStore::purge_expired`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::traits::{CacheStats, CacheStore};
use crate::error::StorageResult;

#[derive(Debug, Default)]
struct MemoryEntry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a key, if it exists and has a TTL.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Drop the entry under `key` if it has expired. Caller holds the write lock.
    fn evict_if_expired(&self, entries: &mut HashMap<String, MemoryEntry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let value = entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.fields.get(field).cloned());

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> StorageResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.evict_if_expired(&mut entries, key, now);
        entries
            .entry(key.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> StorageResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.evict_if_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.fields.insert((*field).to_string(), (*value).to_string());
        }
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = (before - entries.len()) as u64;
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        let entries = self.entries.read().await;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
