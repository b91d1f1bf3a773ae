//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Missing records are not errors; store operations report them with
/// `None` or `false`. Every variant here is fatal to the caller's
/// current unit of work.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted snapshot is unreadable or from an unknown version.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another handle (usually another process) holds the snapshot file.
    #[error("storage is locked by another handle: {}", .0.display())]
    Locked(PathBuf),

    /// The backend refuses further writes.
    #[error("storage is closed")]
    Closed,
}
