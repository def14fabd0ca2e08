//! Typed, failure-tolerant JSON persistence.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::StorageBackend;

/// Typed JSON view over a [`StorageBackend`].
///
/// `load` and `save` never fail. The in-memory state of the caller stays
/// authoritative when storage is missing, corrupt or full; the next
/// successful save reconciles it.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn StorageBackend>,
}

impl PersistentStore {
    /// Create a store over a shared backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// The shared backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Load and parse `key`, or return `fallback` on any failure.
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable persisted value");
                fallback
            }
        }
    }

    /// Load and parse `key`, or return `T::default()` on any failure.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.load(key, T::default())
    }

    /// Fallible load. `Ok(None)` means the key is absent.
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Raw stored text of `key`, unparsed. `Ok(None)` means the key is absent.
    pub fn load_raw(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key)
    }

    /// Serialize and write `value` under `key`.
    ///
    /// Returns the JSON text written, or `None` if serialization or the
    /// write failed (the failure is logged and swallowed).
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<String> {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize value, not persisted");
                return None;
            }
        };

        match self.backend.set(key, &raw) {
            Ok(()) => {
                debug!(key, bytes = raw.len(), "persisted");
                Some(raw)
            }
            Err(e) => {
                warn!(key, error = %e, "failed to persist value, keeping in-memory state");
                None
            }
        }
    }

    /// Delete `key`. Returns false if the backend refused.
    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "failed to remove persisted value");
                false
            }
        }
    }
}
