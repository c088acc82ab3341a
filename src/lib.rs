pub mod common;
pub mod config;
pub mod embedded;
pub mod network;
pub mod storage;

// Public exports
pub use config::{Config, StorageConfig};
pub use embedded::{OpenError, TableSync};
pub use network::{NetworkMonitor, SyncManager, SyncOptions, SyncReport};
pub use storage::{Action, NewRecord, QueueRecord, QueueStore, SyncStatus};
