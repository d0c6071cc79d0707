//! Storage layer errors

use thiserror::Error;

/// Errors raised by cache stores.
///
/// Callers treat every variant the same way (the store is unavailable for
/// this operation); the variants exist for logging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt cache record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_corrupt() {
        let err = StorageError::Corrupt {
            key: "periscope.query.abc".to_string(),
            reason: "bad json".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("periscope.query.abc"));
        assert!(msg.contains("bad json"));
    }
}
