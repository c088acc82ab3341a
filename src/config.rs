use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
    pub monitor: MonitorConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "sled")]
    Sled { data_dir: String },
    #[serde(rename = "memory")]
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sled {
            data_dir: "./data".to_string(),
        }
    }
}

/// Where queued mutations are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Root of the REST collections, joined onto `base_url`.
    pub api_prefix: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Per-request timeout. `None` leaves it to the HTTP client.
    pub request_timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            api_prefix: "/api".to_string(),
            auth_token: None,
            request_timeout_secs: None,
        }
    }
}

impl RemoteConfig {
    /// `base_url` and `api_prefix` joined with exactly one slash between them.
    pub fn api_root(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    /// Drain automatically when connectivity comes back.
    pub auto_sync: bool,
    /// Additional periodic drain while online.
    pub interval_secs: Option<u64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            auto_sync: true,
            interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probed relative to `remote.base_url`.
    pub probe_path: String,
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_path: "/health".to_string(),
            interval_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// e.g. `127.0.0.1:9000`. The admin endpoint is off when unset.
    pub address: Option<String>,
    pub token: Option<String>,
}

impl Config {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TABLESYNC_*` environment overrides on top of this config.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TABLESYNC_DATA_DIR") {
            self.storage = StorageConfig::Sled { data_dir: dir };
        }
        if let Some(url) = lookup("TABLESYNC_BASE_URL") {
            self.remote.base_url = url;
        }
        if let Some(prefix) = lookup("TABLESYNC_API_PREFIX") {
            self.remote.api_prefix = prefix;
        }
        if let Some(token) = lookup("TABLESYNC_AUTH_TOKEN") {
            self.remote.auth_token = Some(token);
        }
        if let Some(raw) = lookup("TABLESYNC_REQUEST_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                field: "TABLESYNC_REQUEST_TIMEOUT_SECS",
                reason: e.to_string(),
            })?;
            self.remote.request_timeout_secs = Some(secs);
        }
        if let Some(raw) = lookup("TABLESYNC_BATCH_SIZE") {
            self.sync.batch_size = raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                field: "TABLESYNC_BATCH_SIZE",
                reason: e.to_string(),
            })?;
        }
        if let Some(addr) = lookup("TABLESYNC_ADMIN_ADDR") {
            self.admin.address = Some(addr);
        }
        if let Some(token) = lookup("TABLESYNC_ADMIN_TOKEN") {
            self.admin.token = Some(token);
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        self.admin_addr()?;
        Ok(())
    }

    /// Parsed admin listen address, `None` when the endpoint is disabled.
    pub fn admin_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.admin
            .address
            .as_deref()
            .map(|raw| {
                raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    field: "admin.address",
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}
