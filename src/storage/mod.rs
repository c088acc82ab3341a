mod error;
pub mod kv;
pub mod offline_queue;

use std::sync::Arc;

pub use self::error::{StorageError, StorageResult};
pub use self::kv::{KeyValueStore, MemoryStore, SledStore};
pub use self::offline_queue::{Action, NewRecord, QueueRecord, QueueStore, SyncStatus};

use crate::config::StorageConfig;

/// Open the key-value backend described by `config`.
pub fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    match config {
        StorageConfig::Sled { data_dir } => Ok(Arc::new(SledStore::open(data_dir)?)),
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
