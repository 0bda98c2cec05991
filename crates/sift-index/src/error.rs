//! Error types for sift-index.

use std::time::Duration;

/// Errors that can occur while watching and indexing files.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector store failure.
    #[error("store error: {0}")]
    Store(#[from] sift_store::StoreError),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The write lock was not acquired in time.
    #[error("write lock not acquired within {0:?}")]
    LockTimeout(Duration),

    /// The indexer worker has stopped.
    #[error("indexer is not running")]
    Stopped,

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
