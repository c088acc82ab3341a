use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::storage::error::{StorageError, StorageResult};

/// Durable key-value backend for client-side state.
///
/// Values are opaque byte strings. Implementations must make a successful
/// `put` visible to every later `get`, including across process restarts
/// for the persistent backends.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Key-value store backed by the default tree of a Sled database.
///
/// Every write is flushed before returning so that a record reported as
/// stored survives a crash.
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> StorageResult<Self> {
        let path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let db = sled::open(&path)?;

        log::info!("Sled key-value store opened at {:?}", path);

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.db.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_put_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.put("k", b"v1".to_vec()).unwrap();
        store.put("k", b"v2".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn sled_store_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = SledStore::open(temp_dir.path()).unwrap();
            store.put("queue", b"[1,2,3]".to_vec()).unwrap();
        }

        let reopened = SledStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.get("queue").unwrap(), Some(b"[1,2,3]".to_vec()));
        assert_eq!(reopened.path(), temp_dir.path());
    }

    #[test]
    fn sled_store_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        let store = SledStore::open(&nested).unwrap();
        store.put("k", b"v".to_vec()).unwrap();

        assert!(nested.exists());
    }
}
