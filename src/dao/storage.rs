use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No document is stored under the key.
    #[error("not found: {key}")]
    NotFound { key: String },
    /// The per-key lock could not be acquired before the wait deadline.
    #[error("timed out waiting for lock `{key}`")]
    LockTimeout { key: String },
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// No entry stored under `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        StorageError::NotFound { key: key.into() }
    }
}
