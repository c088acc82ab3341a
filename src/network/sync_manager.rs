use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::common::timestamp::epoch_millis;
use crate::network::metrics;
use crate::network::sync_status::{SharedSyncStatus, SyncStatusState};
use crate::network::RemoteDispatcher;
use crate::storage::{QueueRecord, QueueStore, StorageError, SyncStatus};

pub const DEFAULT_BATCH_SIZE: usize = 10;

pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;
pub type CompleteFn = Box<dyn Fn(usize, usize) + Send + Sync>;
pub type ErrorFn = Box<dyn Fn(&SyncError) + Send + Sync>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync is already in progress")]
    AlreadySyncing,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Per-call drain options.
///
/// `on_progress(processed, total)` fires after every individual outcome,
/// `on_complete(synced, failed)` once per finished drain (including the
/// empty one) and `on_error` only for orchestration failures.
pub struct SyncOptions {
    pub batch_size: usize,
    on_progress: Option<ProgressFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            on_progress: None,
            on_complete: None,
            on_error: None,
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Outcome tally of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pending records selected at the start of the drain.
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Clears the syncing flag however the drain ends, unwinding included.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains pending queue records against the remote store.
///
/// At most one drain runs per manager. The pending set is read once at
/// the start of a drain; records appended while it runs wait for the next
/// one. Batches run strictly one after another, the records inside a batch
/// are dispatched concurrently. Records that fail are marked `failed` and
/// are not picked up again by later drains until something resets them
/// (see [`QueueStore::requeue_failed`]).
pub struct SyncManager {
    store: Arc<QueueStore>,
    dispatcher: Arc<dyn RemoteDispatcher>,
    syncing: AtomicBool,
    status: SharedSyncStatus,
}

impl SyncManager {
    pub fn new(store: Arc<QueueStore>, dispatcher: Arc<dyn RemoteDispatcher>) -> Self {
        let status = SyncStatusState {
            pending_ops: store.pending_count() as u64,
            ..SyncStatusState::default()
        };

        Self {
            store,
            dispatcher,
            syncing: AtomicBool::new(false),
            status: Arc::new(tokio::sync::Mutex::new(status)),
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn status(&self) -> SharedSyncStatus {
        Arc::clone(&self.status)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    /// Drain the queue. Never fails: returns `true` when every dispatched
    /// record synced (or nothing was pending), `false` when a drain is
    /// already running, any record failed, or the drain itself broke, in
    /// which case `on_error` is invoked.
    pub async fn sync_offline_data(&self, options: SyncOptions) -> bool {
        match self.try_sync(&options).await {
            Ok(report) => report.is_clean(),
            Err(SyncError::AlreadySyncing) => false,
            Err(e) => {
                log::error!("Offline sync aborted: {e}");
                if let Some(on_error) = &options.on_error {
                    on_error(&e);
                }
                false
            }
        }
    }

    /// Drain the queue and return the tally.
    ///
    /// Returns [`SyncError::AlreadySyncing`] without touching the queue when
    /// another drain holds the flag. `on_error` is not invoked here.
    pub async fn try_sync(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            metrics::record_drain_skipped();
            log::debug!("Sync requested while another drain is running, skipping");
            return Err(SyncError::AlreadySyncing);
        }
        let _guard = SyncingGuard(&self.syncing);

        metrics::record_drain_started();
        self.status.lock().await.syncing = true;

        let result = self.drain(options).await;

        self.record_status(&result).await;
        result
    }

    async fn drain(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        let pending: Vec<QueueRecord> = self
            .store
            .try_read_all()?
            .into_iter()
            .filter(|r| r.sync_status == SyncStatus::Pending)
            .collect();

        let total = pending.len();
        if total == 0 {
            if let Some(on_complete) = &options.on_complete {
                on_complete(0, 0);
            }
            return Ok(SyncReport::default());
        }

        let batch_size = options.batch_size.max(1);
        log::info!("Syncing {total} pending records in batches of {batch_size}");

        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };
        let mut processed = 0;

        for batch in pending.chunks(batch_size) {
            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|record| async move { (record, self.sync_item(record).await) })
                .collect();

            while let Some((record, ok)) = in_flight.next().await {
                let status = if ok {
                    SyncStatus::Synced
                } else {
                    SyncStatus::Failed
                };
                if let Err(e) = self.store.set_status(&record.id, status) {
                    log::warn!("Could not persist {status} for record {}: {e}", record.id);
                }

                if ok {
                    report.synced += 1;
                } else {
                    report.failed += 1;
                }
                metrics::record_item(ok);

                processed += 1;
                if let Some(on_progress) = &options.on_progress {
                    on_progress(processed, total);
                }
            }
        }

        match self.store.purge_synced() {
            Ok(purged) => log::debug!("Purged {purged} synced records"),
            Err(e) => log::warn!("Could not purge synced records: {e}"),
        }

        log::info!(
            "Offline sync finished: {} synced, {} failed of {}",
            report.synced,
            report.failed,
            report.total
        );

        if let Some(on_complete) = &options.on_complete {
            on_complete(report.synced, report.failed);
        }

        Ok(report)
    }

    /// Dispatch one record, folding every failure into `false`.
    async fn sync_item(&self, record: &QueueRecord) -> bool {
        match self.dispatcher.dispatch(record).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Failed to sync {} {} ({}): {e}",
                    record.action,
                    record.entity_type,
                    record.id
                );
                false
            }
        }
    }

    async fn record_status(&self, result: &Result<SyncReport, SyncError>) {
        let pending_ops = self.store.pending_count() as u64;
        let mut status = self.status.lock().await;

        status.syncing = false;
        status.pending_ops = pending_ops;
        status.last_sync_ts_ms = epoch_millis();

        match result {
            Ok(report) => {
                status.last_sync_synced = report.synced as u64;
                status.last_sync_failed = report.failed as u64;
                status.last_error = None;
            }
            Err(e) => {
                status.last_sync_synced = 0;
                status.last_sync_failed = 0;
                status.last_error = Some(e.to_string());
            }
        }
    }
}
