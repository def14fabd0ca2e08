//! Transport that notices changes by re-reading shared storage.

use crate::storage::StorageBackend;
use crate::types::ContextId;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::transport::{ChangeTransport, DEFAULT_TRANSPORT_BUFFER};
use super::types::{ExternalChange, ExternalWatch};

struct PolledWatcher {
    id: u64,
    context: ContextId,
    key: String,
    /// Last value this watcher was told about (or wrote itself).
    last_seen: Option<String>,
    sender: Sender<ExternalChange>,
}

/// Transport for contexts living in different processes on one storage.
///
/// Writes made in this process are pushed to the other local contexts
/// immediately, like [`LocalTransport`](super::LocalTransport). Writes made
/// by other processes are found by [`poll`](ChangeTransport::poll), which
/// compares each watched key in storage with what its watcher last saw.
/// Typically paired with [`FileStorage`](crate::FileStorage), one transport
/// per process.
pub struct PollingTransport {
    storage: Arc<dyn StorageBackend>,
    watchers: Mutex<Vec<PolledWatcher>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl PollingTransport {
    /// Create a transport watching `storage`.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_buffer_size(storage, DEFAULT_TRANSPORT_BUFFER)
    }

    /// Create a transport buffering up to `buffer_size` signals per watcher.
    pub fn with_buffer_size(storage: Arc<dyn StorageBackend>, buffer_size: usize) -> Self {
        Self {
            storage,
            watchers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Current value of `key`, or None if storage could not be read.
    fn read(&self, key: &str) -> Option<Option<String>> {
        match self.storage.get(key) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "poll could not read key");
                None
            }
        }
    }
}

impl ChangeTransport for PollingTransport {
    fn publish(&self, origin: ContextId, key: &str, value: Option<&str>) {
        let change = ExternalChange {
            key: key.to_string(),
            new_value: value.map(str::to_string),
            origin: Some(origin),
        };

        let mut watchers = self.watchers.lock();
        let mut to_remove = Vec::new();

        for watcher in watchers.iter_mut().filter(|w| w.key == key) {
            if watcher.context == origin {
                // The writer already holds this value; polling must not echo it
                watcher.last_seen = change.new_value.clone();
                continue;
            }
            match watcher.sender.try_send(change.clone()) {
                Ok(()) => watcher.last_seen = change.new_value.clone(),
                Err(TrySendError::Full(_)) => {
                    // last_seen is left behind so the next poll retries
                    warn!(key, context = %watcher.context, "watcher buffer full, change deferred to poll");
                }
                Err(TrySendError::Disconnected(_)) => to_remove.push(watcher.id),
            }
        }

        if !to_remove.is_empty() {
            watchers.retain(|w| !to_remove.contains(&w.id));
            debug!(key, pruned = to_remove.len(), "pruned closed watchers");
        }
    }

    fn on_external_change(&self, context: ContextId, key: &str) -> ExternalWatch {
        let (sender, receiver) = bounded(self.buffer_size);
        let last_seen = self.read(key).flatten();
        self.watchers.lock().push(PolledWatcher {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            context,
            key: key.to_string(),
            last_seen,
            sender,
        });
        ExternalWatch::new(key, receiver)
    }

    fn poll(&self) {
        let mut watchers = self.watchers.lock();
        let mut current: HashMap<String, Option<Option<String>>> = HashMap::new();
        let mut to_remove = Vec::new();
        let mut queued = 0;

        for watcher in watchers.iter_mut() {
            let value = current
                .entry(watcher.key.clone())
                .or_insert_with_key(|key| self.read(key));
            let value = match value {
                Some(value) => value,
                None => continue,
            };
            if *value == watcher.last_seen {
                continue;
            }

            let change = ExternalChange {
                key: watcher.key.clone(),
                new_value: value.clone(),
                origin: None,
            };
            match watcher.sender.try_send(change) {
                Ok(()) => {
                    watcher.last_seen = value.clone();
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => {
                    warn!(key = %watcher.key, context = %watcher.context, "watcher buffer full, retrying next poll");
                }
                Err(TrySendError::Disconnected(_)) => to_remove.push(watcher.id),
            }
        }

        if !to_remove.is_empty() {
            watchers.retain(|w| !to_remove.contains(&w.id));
        }
        if queued > 0 {
            debug!(queued, "poll found external changes");
        }
    }
}
