use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::timestamp::{Clock, SystemClock};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::kv::KeyValueStore;

/// Kind of remote mutation a queued record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// A single persisted mutation waiting to reach the remote store.
///
/// Serialized with camelCase field names so the persisted array reads the
/// same as the payloads the UI features build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: String,
    pub entity_type: String,
    pub action: Action,
    #[serde(default)]
    pub data: Value,
    /// Creation time in milliseconds since UNIX_EPOCH.
    pub timestamp: u64,
    pub sync_status: SyncStatus,
}

/// Producer-side shape of a record, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub id: String,
    pub entity_type: String,
    pub action: Action,
    #[serde(default)]
    pub data: Value,
}

impl NewRecord {
    /// Build a record with a freshly generated UUID v4 id.
    pub fn new(entity_type: impl Into<String>, action: Action, data: Value) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), entity_type, action, data)
    }

    pub fn with_id(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        action: Action,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            action,
            data,
        }
    }
}

/// Durable, ordered queue of pending mutations.
///
/// The whole sequence lives as one JSON array under a single key of the
/// backing [`KeyValueStore`] and is read and rewritten on every mutation.
/// A store-local lock serializes those read-modify-write cycles, so
/// producers may append while a drain is rewriting statuses.
///
/// Undecodable content is logged and treated as an empty queue; the next
/// successful write replaces it.
pub struct QueueStore {
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl QueueStore {
    pub const QUEUE_KEY: &'static str = "offline_queue";

    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Stamp `record` as pending at the current time and append it.
    ///
    /// No deduplication by id is performed.
    pub fn append(&self, record: NewRecord) -> StorageResult<QueueRecord> {
        let stored = QueueRecord {
            id: record.id,
            entity_type: record.entity_type,
            action: record.action,
            data: record.data,
            timestamp: self.clock.now_ms(),
            sync_status: SyncStatus::Pending,
        };

        let result = self.mutate(|records| {
            records.push(stored.clone());
            true
        });

        match result {
            Ok(_) => {
                log::debug!(
                    "Queued {} {} ({})",
                    stored.action,
                    stored.entity_type,
                    stored.id
                );
                Ok(stored)
            }
            Err(e) => {
                log::error!("Failed to append record {} to offline queue: {e}", stored.id);
                Err(e)
            }
        }
    }

    /// All records in insertion order. Never fails: any storage error is
    /// logged and reported as an empty queue.
    pub fn read_all(&self) -> Vec<QueueRecord> {
        match self.try_read_all() {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to read offline queue: {e}");
                Vec::new()
            }
        }
    }

    /// Like [`read_all`](Self::read_all) but surfaces backend failures.
    pub fn try_read_all(&self) -> StorageResult<Vec<QueueRecord>> {
        let _guard = self.lock()?;
        self.load()
    }

    /// Rewrite the status of every record whose id matches.
    pub fn set_status(&self, id: &str, status: SyncStatus) -> StorageResult<()> {
        let result = self.mutate(|records| {
            let mut touched = false;
            for record in records.iter_mut().filter(|r| r.id == id) {
                record.sync_status = status;
                touched = true;
            }
            touched
        });

        match result {
            Ok(touched) => {
                if !touched {
                    log::debug!("No queued record with id {id} to mark {status}");
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to mark record {id} as {status}: {e}");
                Err(e)
            }
        }
    }

    /// Drop every record whose status is `synced`.
    pub fn purge_synced(&self) -> StorageResult<usize> {
        let mut removed = 0;
        let result = self.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.sync_status != SyncStatus::Synced);
            removed = before - records.len();
            removed > 0
        });

        match result {
            Ok(_) => Ok(removed),
            Err(e) => {
                log::error!("Failed to purge synced records: {e}");
                Err(e)
            }
        }
    }

    /// Reset every `failed` record to `pending` so the next drain picks it
    /// up again. Returns the number of records reset.
    pub fn requeue_failed(&self) -> StorageResult<usize> {
        let mut reset = 0;
        let result = self.mutate(|records| {
            for record in records
                .iter_mut()
                .filter(|r| r.sync_status == SyncStatus::Failed)
            {
                record.sync_status = SyncStatus::Pending;
                reset += 1;
            }
            reset > 0
        });

        match result {
            Ok(_) => Ok(reset),
            Err(e) => {
                log::error!("Failed to requeue failed records: {e}");
                Err(e)
            }
        }
    }

    /// Remove the persisted queue entirely.
    pub fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock()?;
        self.backend.remove(Self::QUEUE_KEY).map_err(|e| {
            log::error!("Failed to clear offline queue: {e}");
            e
        })
    }

    pub fn len(&self) -> usize {
        self.read_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records_with_status(&self, status: SyncStatus) -> Vec<QueueRecord> {
        self.read_all()
            .into_iter()
            .filter(|r| r.sync_status == status)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.count_status(SyncStatus::Pending)
    }

    pub fn failed_count(&self) -> usize {
        self.count_status(SyncStatus::Failed)
    }

    fn count_status(&self, status: SyncStatus) -> usize {
        self.read_all()
            .iter()
            .filter(|r| r.sync_status == status)
            .count()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Caller must hold the write lock.
    fn load(&self) -> StorageResult<Vec<QueueRecord>> {
        let bytes = match self.backend.get(Self::QUEUE_KEY)? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };

        match serde_json::from_slice::<Vec<QueueRecord>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                log::warn!("Offline queue content is corrupt, treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Read-modify-write under the lock. `f` returns whether it changed
    /// anything; unchanged queues are not rewritten.
    fn mutate<F>(&self, f: F) -> StorageResult<bool>
    where
        F: FnOnce(&mut Vec<QueueRecord>) -> bool,
    {
        let _guard = self.lock()?;
        let mut records = self.load()?;

        if !f(&mut records) {
            return Ok(false);
        }

        let bytes = serde_json::to_vec(&records)?;
        self.backend.put(Self::QUEUE_KEY, bytes)?;
        Ok(true)
    }
}
