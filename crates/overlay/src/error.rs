//! Error types for the overlay crate.

use thiserror::Error;
use tiercache_storage::StorageError;

/// Errors from overlay construction, stream wrapping and replication.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Error from an underlying storage tier.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Overlay built with an unsupported tier configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Stream handle that is not open.
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    /// Job (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job queue rejected a job.
    #[error("Queue error: {0}")]
    Queue(String),
}

impl From<OverlayError> for StorageError {
    fn from(e: OverlayError) -> Self {
        match e {
            OverlayError::Storage(inner) => inner,
            OverlayError::InvalidConfiguration(msg) | OverlayError::InvalidStream(msg) => {
                StorageError::InvalidArgument(msg)
            }
            other => StorageError::Other(other.to_string()),
        }
    }
}
