use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Coarse link quality derived from probe round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Good,
    Degraded,
    Unknown,
}

impl ConnectionQuality {
    const DEGRADED_AFTER: Duration = Duration::from_millis(800);

    pub fn from_round_trip(rtt: Duration) -> Self {
        if rtt >= Self::DEGRADED_AFTER {
            ConnectionQuality::Degraded
        } else {
            ConnectionQuality::Good
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub state: ConnectivityState,
    pub quality: ConnectionQuality,
    /// Number of offline→online transitions seen by the publishing
    /// [`NetworkMonitor`]. Maintained by the monitor; the value passed to
    /// [`NetworkMonitor::update`] is ignored.
    pub reconnects: u64,
}

impl NetworkStatus {
    pub fn new(state: ConnectivityState, quality: ConnectionQuality) -> Self {
        Self {
            state,
            quality,
            reconnects: 0,
        }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityState::Connected, ConnectionQuality::Unknown)
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityState::Disconnected, ConnectionQuality::Unknown)
    }

    pub fn is_online(&self) -> bool {
        self.state == ConnectivityState::Connected
    }
}

/// Read-only, continuously updated view of connectivity.
///
/// State lives in a watch channel: subscribers are woken only when the
/// status actually changes, so an `online` flip from `false` to `true`
/// is observed exactly once per reconnection. State can be pushed by the
/// host (`set_online`, e.g. from OS network events) or produced by the
/// probe loop in [`run`](Self::run).
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }

    /// Push a connectivity change. Returns whether the status changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.update(if online {
            NetworkStatus::online()
        } else {
            NetworkStatus::offline()
        })
    }

    /// Publish `status`. Returns whether state or quality changed.
    ///
    /// Every offline→online change bumps [`NetworkStatus::reconnects`], so
    /// a subscriber that only looks at the latest value still notices a
    /// reconnection it slept through.
    pub fn update(&self, status: NetworkStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if current.state == status.state && current.quality == status.quality {
                return false;
            }

            let regained = status.is_online() && !current.is_online();
            if current.is_online() != status.is_online() {
                log::info!(
                    "Network is now {}",
                    if status.is_online() { "online" } else { "offline" }
                );
            }
            *current = NetworkStatus {
                reconnects: current.reconnects + u64::from(regained),
                ..status
            };
            true
        })
    }

    /// Probe `probe_url` every `interval` and publish the result.
    ///
    /// The first failed probe reports `Disconnected`, consecutive failures
    /// after that report `Reconnecting`. Runs until the task is aborted.
    pub async fn run(&self, probe_url: String, interval: Duration) {
        let client = reqwest::Client::new();
        let mut reconnecting = false;

        loop {
            let probe = Self::probe(&client, &probe_url, interval).await;

            let status = match probe {
                Some(rtt) => {
                    reconnecting = false;
                    NetworkStatus::new(
                        ConnectivityState::Connected,
                        ConnectionQuality::from_round_trip(rtt),
                    )
                }
                None if reconnecting => NetworkStatus::new(
                    ConnectivityState::Reconnecting,
                    ConnectionQuality::Unknown,
                ),
                None => {
                    reconnecting = true;
                    NetworkStatus::offline()
                }
            };

            self.update(status);

            sleep(interval).await;
        }
    }

    /// Single reachability probe. Any HTTP response counts as reachable;
    /// only transport failures count as offline.
    pub async fn check_once(target: &str) -> bool {
        let client = reqwest::Client::new();
        Self::probe(&client, target, Duration::from_secs(5))
            .await
            .is_some()
    }

    async fn probe(client: &reqwest::Client, target: &str, timeout: Duration) -> Option<Duration> {
        let started = Instant::now();
        match client.get(target).timeout(timeout).send().await {
            Ok(_) => Some(started.elapsed()),
            Err(e) => {
                log::debug!("Connectivity probe to {target} failed: {e}");
                None
            }
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::offline())
    }
}
