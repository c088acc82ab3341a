use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::network::{NetworkStatus, SyncManager, SyncOptions};

/// Background task that drains the queue whenever connectivity returns.
///
/// Triggers a drain at start-up if already online with pending records,
/// on every offline→online transition, and, when an interval is set, on
/// each tick while online. Quality-only changes of the network status are
/// ignored.
///
/// Transitions are detected through [`NetworkStatus::reconnects`] rather
/// than by comparing online flags, so a reconnection that happens while a
/// drain is running (or between two polls of the channel) still triggers
/// a drain once the worker looks again.
pub struct SyncWorker {
    manager: Arc<SyncManager>,
    network: watch::Receiver<NetworkStatus>,
    interval: Option<Duration>,
    batch_size: usize,
}

impl SyncWorker {
    pub fn new(
        manager: Arc<SyncManager>,
        network: watch::Receiver<NetworkStatus>,
        interval: Option<Duration>,
        batch_size: usize,
    ) -> Self {
        Self {
            manager,
            network,
            interval,
            batch_size,
        }
    }

    /// Runs until the network monitor is dropped.
    pub async fn run(mut self) {
        let initial = *self.network.borrow_and_update();
        let mut seen_reconnects = initial.reconnects;
        if initial.is_online() {
            self.sync_if_pending("startup").await;
        }

        // A `None` interval still needs a timer to select on; park it far out.
        let period = self.interval.unwrap_or(Duration::from_secs(365 * 24 * 3600));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = self.network.changed() => {
                    if changed.is_err() {
                        log::debug!("Network monitor gone, stopping sync worker");
                        return;
                    }
                    let status = *self.network.borrow_and_update();
                    let regained = status.reconnects != seen_reconnects;
                    seen_reconnects = status.reconnects;
                    if regained && status.is_online() {
                        self.sync_if_pending("connectivity regained").await;
                    }
                }
                _ = ticker.tick(), if self.interval.is_some() => {
                    let online = self.network.borrow().is_online();
                    if online {
                        self.sync_if_pending("interval").await;
                    }
                }
            }
        }
    }

    async fn sync_if_pending(&self, reason: &str) {
        let pending = self.manager.pending_count();
        if pending == 0 {
            return;
        }

        log::info!("Starting offline sync ({reason}), {pending} records pending");
        let synced_all = self
            .manager
            .sync_offline_data(
                SyncOptions::new()
                    .batch_size(self.batch_size)
                    .on_error(|e| log::error!("SyncWorker error: {e}")),
            )
            .await;

        if !synced_all {
            log::warn!("Offline sync ({reason}) left records unsynced");
        }
    }
}
