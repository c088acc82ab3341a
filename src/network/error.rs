use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    #[error("Remote rejected {method} {url} with status {status}")]
    StatusError {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl NetworkError {
    /// HTTP status for rejections, `None` for transport-level failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::StatusError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
