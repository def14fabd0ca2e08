//! Cross-context change transport.

use crate::types::ContextId;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{ExternalChange, ExternalWatch};

/// Default number of undelivered signals buffered per watcher.
pub const DEFAULT_TRANSPORT_BUFFER: usize = 256;

/// Carries persisted-value changes between contexts.
///
/// This is the seam where a platform storage-event mechanism plugs in.
/// `publish` is called after a successful write; every other context
/// watching the key eventually receives an [`ExternalChange`]. The writing
/// context never receives its own signal.
pub trait ChangeTransport: Send + Sync {
    /// Announce that `key` now holds `value` (None = removed).
    fn publish(&self, origin: ContextId, key: &str, value: Option<&str>);

    /// Start receiving changes to `key` made by contexts other than `context`.
    fn on_external_change(&self, context: ContextId, key: &str) -> ExternalWatch;

    /// Queue changes that were not pushed, such as writes by another process.
    /// Called before a context drains its watches.
    fn poll(&self) {}
}

struct Watcher {
    id: u64,
    context: ContextId,
    key: String,
    sender: Sender<ExternalChange>,
}

/// In-process transport shared by every context of a process.
///
/// Delivery is queued: a receiving context sees a change once it drains its
/// watch. A watcher with a full buffer loses the signal, the same way a
/// platform may drop a storage event.
pub struct LocalTransport {
    watchers: RwLock<Vec<Watcher>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl LocalTransport {
    /// Create a transport with the default per-watcher buffer.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_TRANSPORT_BUFFER)
    }

    /// Create a transport buffering up to `buffer_size` signals per watcher.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watchers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTransport for LocalTransport {
    fn publish(&self, origin: ContextId, key: &str, value: Option<&str>) {
        let change = ExternalChange {
            key: key.to_string(),
            new_value: value.map(str::to_string),
            origin: Some(origin),
        };

        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for watcher in watchers.iter() {
                if watcher.key != key || watcher.context == origin {
                    continue;
                }
                match watcher.sender.try_send(change.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(key, context = %watcher.context, "watcher buffer full, change signal lost");
                    }
                    Err(TrySendError::Disconnected(_)) => to_remove.push(watcher.id),
                }
            }
        }

        // Remove watchers whose receiving side is gone
        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            watchers.retain(|w| !to_remove.contains(&w.id));
            debug!(key, pruned = to_remove.len(), "pruned closed watchers");
        }
    }

    fn on_external_change(&self, context: ContextId, key: &str) -> ExternalWatch {
        let (sender, receiver) = bounded(self.buffer_size);
        self.watchers.write().push(Watcher {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            context,
            key: key.to_string(),
            sender,
        });
        ExternalWatch::new(key, receiver)
    }
}
