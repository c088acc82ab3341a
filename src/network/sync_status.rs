use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

/// In-memory state for sync status reporting on this client.
///
/// A record of the last drain, not a live view: records appended since
/// then are not reflected here. Use [`SyncManager::pending_count`] for the
/// current figure.
///
/// [`SyncManager::pending_count`]: crate::network::SyncManager::pending_count
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatusState {
    /// Records still `pending` when the last drain finished (or when the
    /// manager was created, before any drain).
    pub pending_ops: u64,
    /// Whether a drain is currently running.
    pub syncing: bool,
    /// Records marked `synced` by the last drain.
    pub last_sync_synced: u64,
    /// Records marked `failed` by the last drain.
    pub last_sync_failed: u64,
    /// Timestamp of the last drain, in milliseconds since UNIX_EPOCH.
    pub last_sync_ts_ms: u64,
    /// Last orchestration error message, if any (None if last drain completed).
    pub last_error: Option<String>,
}

pub type SharedSyncStatus = Arc<Mutex<SyncStatusState>>;
