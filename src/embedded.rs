use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigError};
use crate::network::{
    run_http_admin, AdminState, HttpDispatcher, NetworkError, NetworkMonitor, NetworkStatus,
    RemoteDispatcher, SyncError, SyncManager, SyncOptions, SyncReport, SyncWorker,
};
use crate::storage::{
    open_backend, Action, KeyValueStore, NewRecord, QueueRecord, QueueStore, StorageError,
};

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// In-process offline sync for a client application.
///
/// Owns the queue store, the sync manager and the network monitor so the
/// host wires a single object into its UI features: producers call
/// [`enqueue`](Self::enqueue), the status badge reads
/// [`pending_count`](Self::pending_count) and [`is_syncing`](Self::is_syncing),
/// and a "Sync now" action calls [`sync_now`](Self::sync_now).
pub struct TableSync {
    config: Config,
    store: Arc<QueueStore>,
    manager: Arc<SyncManager>,
    monitor: Arc<NetworkMonitor>,
}

impl TableSync {
    /// Open the configured storage and HTTP dispatcher.
    ///
    /// The network starts out offline until the host or the probe loop
    /// reports otherwise.
    pub fn open(config: Config) -> Result<Self, OpenError> {
        config.validate()?;
        let backend = open_backend(&config.storage)?;
        let dispatcher = Arc::new(HttpDispatcher::new(&config.remote)?);
        Ok(Self::with_parts(config, backend, dispatcher))
    }

    /// Assemble from explicit parts, e.g. a custom backend or dispatcher.
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn KeyValueStore>,
        dispatcher: Arc<dyn RemoteDispatcher>,
    ) -> Self {
        let store = Arc::new(QueueStore::new(backend));
        let manager = Arc::new(SyncManager::new(Arc::clone(&store), dispatcher));
        let monitor = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));

        Self {
            config,
            store,
            manager,
            monitor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Queue a mutation under a generated id.
    pub fn enqueue(
        &self,
        entity_type: &str,
        action: Action,
        data: Value,
    ) -> Result<QueueRecord, StorageError> {
        self.store.append(NewRecord::new(entity_type, action, data))
    }

    pub fn enqueue_record(&self, record: NewRecord) -> Result<QueueRecord, StorageError> {
        self.store.append(record)
    }

    pub fn records(&self) -> Vec<QueueRecord> {
        self.store.read_all()
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    pub fn is_syncing(&self) -> bool {
        self.manager.is_syncing()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn set_online(&self, online: bool) {
        self.monitor.set_online(online);
    }

    /// Run one drain with the configured batch size.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        let options = SyncOptions::new().batch_size(self.config.sync.batch_size);
        self.manager.try_sync(&options).await
    }

    /// Spawn the probe loop, the auto-sync worker (if enabled) and the admin
    /// endpoint (if configured). Must be called from within a Tokio runtime.
    ///
    /// Nothing is spawned when an error is returned.
    pub fn spawn_background(&self) -> Result<Vec<JoinHandle<()>>, OpenError> {
        let admin_addr = self.config.admin_addr()?;
        let mut handles = Vec::new();

        let probe_url = format!(
            "{}/{}",
            self.config.remote.base_url.trim_end_matches('/'),
            self.config.monitor.probe_path.trim_start_matches('/')
        );
        let probe_interval = Duration::from_millis(self.config.monitor.interval_ms);
        let monitor = Arc::clone(&self.monitor);
        handles.push(tokio::spawn(async move {
            monitor.run(probe_url, probe_interval).await;
        }));

        if self.config.sync.auto_sync {
            let worker = SyncWorker::new(
                Arc::clone(&self.manager),
                self.monitor.subscribe(),
                self.config.sync.interval_secs.map(Duration::from_secs),
                self.config.sync.batch_size,
            );
            handles.push(tokio::spawn(worker.run()));
        }

        if let Some(addr) = admin_addr {
            let state = Arc::new(AdminState {
                manager: Arc::clone(&self.manager),
                monitor: Arc::clone(&self.monitor),
                batch_size: self.config.sync.batch_size,
                token: self.config.admin.token.clone(),
            });
            handles.push(tokio::spawn(async move {
                if let Err(e) = run_http_admin(addr, state).await {
                    log::error!("Admin HTTP server error: {e}");
                }
            }));
        }

        Ok(handles)
    }
}
