//! Durable key-value storage shared by every context.
//!
//! A [`StorageBackend`] is the raw string store (the analogue of a browser's
//! local storage). [`PersistentStore`] wraps a backend with typed JSON
//! load/save that never fails: missing, corrupt or unwritable data degrades
//! to a caller-supplied fallback.
//!
//! Two backends are provided:
//! - [`MemoryStorage`]: in-process map with an optional byte quota
//! - [`FileStorage`]: one JSON file per key, safe to share between processes

mod backend;
mod file;
mod persistent;

pub use backend::{MemoryStorage, StorageBackend};
pub use file::FileStorage;
pub use persistent::PersistentStore;
