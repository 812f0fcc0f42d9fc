//! Durable key-value storage.
//!
//! Values are UTF-8 strings stored under string keys, the same contract as
//! browser local storage. [`FileStore`] keeps every key in one JSON object on
//! disk; [`MemoryStore`] is used by tests and ephemeral sessions.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("value for key '{0}' is not valid UTF-8")]
    NotUtf8(String),
    #[error("failed to encode storage file: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store. A file that is not a JSON object of
    /// strings is logged and treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        "Storage file {} is unreadable ({}), starting empty",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!("Opened storage {} with {} keys", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file atomically: the temp file is synced before the rename
    /// so a crash leaves either the old contents or the new ones.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| StorageError::Io { path, source }
        };

        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(&encoded).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        sync_parent_dir(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => p,
        None => Path::new("."),
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!("Failed to sync directory {}: {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(lock(&self.entries)
            .get(key)
            .map(|v| v.clone().into_bytes()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let value =
            String::from_utf8(value.to_vec()).map_err(|_| StorageError::NotUtf8(key.to_string()))?;
        let mut guard = lock(&self.entries);
        let mut next = guard.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *guard = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries);
        if !guard.contains_key(key) {
            return Ok(());
        }
        let mut next = guard.clone();
        next.remove(key);
        self.flush(&next)?;
        *guard = next;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set`/`remove` fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.check_writable()?;
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> PathBuf {
        dir.path().join("data").join("storage.json")
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", b"[1,2]").unwrap();
        store.set("b", b"true").unwrap();
        store.remove("b").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap(), Some(b"[1,2]".to_vec()));
        assert_eq!(reopened.get("b").unwrap(), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn file_store_recovers_from_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
        store.set("k", b"v").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"k\""));
    }

    #[test]
    fn leftover_temp_file_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let store = FileStore::open(&path).unwrap();
        store.set("a", b"1").unwrap();
        fs::write(path.with_extension("tmp"), "half-written").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap(), Some(b"1".to_vec()));
        reopened.set("b", b"2").unwrap();
        assert!(!path.with_extension("tmp").exists());

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk["b"], "2");
    }

    #[test]
    fn file_store_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(store_path(&dir)).unwrap();
        let err = store.set("bin", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, StorageError::NotUtf8(k) if k == "bin"));
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let store = MemoryStore::new();
        store.set("k", b"1").unwrap();
        store.set_fail_writes(true);
        assert!(store.set("k", b"2").is_err());
        assert!(store.remove("k").is_err());
        assert_eq!(store.get("k").unwrap(), Some(b"1".to_vec()));
        store.set_fail_writes(false);
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
