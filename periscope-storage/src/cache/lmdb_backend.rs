//! LMDB-backed cache store.
//!
//! Uses the heed crate to keep query results in a memory-mapped file, so
//! the cache survives a restart of the service. Each key holds one JSON
//! record carrying its fields and an absolute wall-clock expiry.
//!
//! Reads use read transactions; every mutation runs in its own write
//! transaction, so multi-field writes are atomic. Expiry is lazy: expired
//! records read as absent and are removed by writes or
//! [`CacheStore::purge_expired`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use serde::{Deserialize, Serialize};

use super::traits::{CacheStats, CacheStore};
use crate::error::{StorageError, StorageResult};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for StorageError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(reason) | LmdbCacheError::DbOpen(reason) => {
                StorageError::Unavailable { reason }
            }
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> StorageError {
    LmdbCacheError::Transaction(e.to_string()).into()
}

/// On-disk representation of one cache entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LmdbRecord {
    fields: BTreeMap<String, String>,
    /// Unix milliseconds after which the record is dead. `None` never expires.
    expires_at_ms: Option<i64>,
}

impl LmdbRecord {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn deadline_ms(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl_ms)
}

/// Persistent [`CacheStore`] on LMDB.
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl LmdbCacheStore {
    /// Open (or create) the store under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process
        // and the file is not truncated while mapped.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    fn decode(key: &str, bytes: &[u8]) -> StorageResult<LmdbRecord> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(record: &LmdbRecord) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(record)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()).into())
    }

    /// Load a live record inside a write transaction. Expired records are
    /// deleted and reported as absent.
    fn load_live(&self, wtxn: &mut RwTxn<'_>, key: &str) -> StorageResult<Option<LmdbRecord>> {
        let record = match self.db.get(wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Self::decode(key, bytes)?,
            None => return Ok(None),
        };
        if record.is_expired(now_ms()) {
            self.db.delete(wtxn, key.as_bytes()).map_err(txn_err)?;
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn store(&self, wtxn: &mut RwTxn<'_>, key: &str, record: &LmdbRecord) -> StorageResult<()> {
        let bytes = Self::encode(record)?;
        self.db
            .put(wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let value = match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => {
                let record = Self::decode(key, bytes)?;
                if record.is_expired(now_ms()) {
                    None
                } else {
                    record.fields.get(field).cloned()
                }
            }
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> StorageResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut record = self.load_live(&mut wtxn, key)?.unwrap_or_default();
        record.fields.insert(field.to_string(), value.to_string());
        self.store(&mut wtxn, key, &record)?;
        wtxn.commit().map_err(txn_err)
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let refreshed = match self.load_live(&mut wtxn, key)? {
            Some(mut record) => {
                record.expires_at_ms = Some(deadline_ms(ttl));
                self.store(&mut wtxn, key, &record)?;
                true
            }
            None => false,
        };
        wtxn.commit().map_err(txn_err)?;
        Ok(refreshed)
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> StorageResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut record = self.load_live(&mut wtxn, key)?.unwrap_or_default();
        for (field, value) in fields {
            record.fields.insert((*field).to_string(), (*value).to_string());
        }
        record.expires_at_ms = Some(deadline_ms(ttl));
        self.store(&mut wtxn, key, &record)?;
        wtxn.commit().map_err(txn_err)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let existed = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(existed)
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let now = now_ms();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let mut expired: Vec<Vec<u8>> = Vec::new();
        for item in self.db.iter(&wtxn).map_err(txn_err)? {
            let (key, bytes) = item.map_err(txn_err)?;
            // Undecodable records are dropped along with expired ones.
            let dead = serde_json::from_slice::<LmdbRecord>(bytes)
                .map(|record| record.is_expired(now))
                .unwrap_or(true);
            if dead {
                expired.push(key.to_vec());
            }
        }

        for key in &expired {
            self.db.delete(&mut wtxn, key).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        let removed = expired.len() as u64;
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        if removed > 0 {
            tracing::debug!(removed, "Purged expired LMDB cache records");
        }
        Ok(removed)
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_err)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}
