//! Error types for the synchronization core.
//!
//! Only storage backends and the fallible loaders return these. The
//! registries and the bus swallow them and log instead.

use thiserror::Error;

/// Main error type for storage and platform operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded writing {key}: needs {needed} bytes, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Alert failed: {0}")]
    AlertFailed(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            SyncError::Deserialization(e.to_string())
        } else {
            SyncError::Serialization(e.to_string())
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, SyncError>;
