mod error;

pub mod client;
pub mod connectivity;
pub mod http_admin;
pub mod metrics;
pub mod sync_manager;
pub mod sync_status;
pub mod sync_worker;

pub use client::{request_for, HttpDispatcher, RemoteDispatcher, RemoteRequest};
pub use connectivity::*;
pub use error::NetworkError;
pub use http_admin::{run_http_admin, AdminState};
pub use sync_manager::{SyncError, SyncManager, SyncOptions, SyncReport, DEFAULT_BATCH_SIZE};
pub use sync_status::{SharedSyncStatus, SyncStatusState};
pub use sync_worker::SyncWorker;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_error_kind() {
        let conn = NetworkError::ConnectionError("boom".to_string());
        assert!(format!("{conn}").contains("Connection error"));

        let status = NetworkError::StatusError {
            method: "DELETE".to_string(),
            url: "/api/reservations/r2".to_string(),
            status: 500,
        };
        let msg = format!("{status}");
        assert!(msg.contains("DELETE /api/reservations/r2"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn sync_error_wraps_storage_error() {
        let err: SyncError = crate::storage::StorageError::LockPoisoned.into();
        assert!(err.to_string().contains("Queue lock poisoned"));
    }
}
