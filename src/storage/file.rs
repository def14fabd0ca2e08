//! File-backed storage.

use crate::error::{Result, SyncError};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::backend::StorageBackend;

/// Attempts to take the write lock before giving up.
const LOCK_ATTEMPTS: u32 = 50;

/// Pause between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(2);

/// Storage keeping one JSON file per key in a directory.
///
/// File names are the SHA-256 of the key, so any key is a valid name.
/// Writers serialize on an exclusive lock file and replace values by
/// renaming a fully written temp file, so readers in other processes never
/// observe a torn value. Pair it with a
/// [`PollingTransport`](crate::PollingTransport) so contexts in other
/// processes are told about changes.
pub struct FileStorage {
    /// Base directory.
    path: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Base directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of the file holding `key`.
    pub fn value_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}.json", Self::file_stem(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}.tmp", Self::file_stem(key)))
    }

    fn file_stem(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Take the directory-wide write lock. Released when the file is dropped.
    fn acquire_lock(&self) -> Result<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.path.join("LOCK"))?;

        for _ in 0..LOCK_ATTEMPTS {
            if lock_file.try_lock_exclusive().is_ok() {
                return Ok(lock_file);
            }
            thread::sleep(LOCK_RETRY_DELAY);
        }

        Err(SyncError::Locked)
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.value_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let temp_path = self.temp_path(key);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.value_path(key))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("storage")).unwrap();

        storage.set("notifications", "[]").unwrap();
        assert_eq!(storage.get("notifications").unwrap().as_deref(), Some("[]"));
        assert_eq!(storage.get("favorites").unwrap(), None);
    }

    #[test]
    fn test_two_handles_share_directory() {
        let dir = TempDir::new().unwrap();
        let a = FileStorage::open(dir.path()).unwrap();
        let b = FileStorage::open(dir.path()).unwrap();

        a.set("favorites", "[\"seller-9\"]").unwrap();
        assert_eq!(b.get("favorites").unwrap().as_deref(), Some("[\"seller-9\"]"));

        b.set("favorites", "[]").unwrap();
        assert_eq!(a.get("favorites").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_awkward_keys_are_hashed() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("../escape/attempt", "1").unwrap();
        let path = storage.value_path("../escape/attempt");
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("k", "v").unwrap();
        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);

        // Missing key is fine
        storage.remove("k").unwrap();
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("k", "v").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
