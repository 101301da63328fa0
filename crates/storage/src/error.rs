//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
///
/// A path that does not exist is not an error: read operations report it as
/// `Ok(None)` and boolean operations as `Ok(false)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Path escapes the storage root or is otherwise malformed.
    #[error("Invalid path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: String,
    },

    /// Lock conflict.
    #[error("Path is locked: {path}")]
    Locked {
        /// The locked path.
        path: String,
    },

    /// Invalid argument passed to a storage operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error raised by a storage wrapper that is not tied to a single path.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create an Io error from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
