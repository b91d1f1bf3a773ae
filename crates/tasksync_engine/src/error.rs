//! Error types for the sync engine.

use tasksync_remote::RemoteError;
use tasksync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine-level failures. Any of these fails the whole sync run.
///
/// Per-record push failures are not errors at this level; they are logged
/// and counted in the run's report.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A whole-phase remote call failed (for example the pull fetch).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Returns true if a later run may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Storage(_) => false,
        }
    }
}
