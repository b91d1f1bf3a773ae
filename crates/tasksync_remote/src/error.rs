//! Error types for remote operations.

use tasksync_core::TaskId;
use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by a remote task store.
///
/// The type is `Clone` so the same error can be delivered in-band to every
/// live-snapshot subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No authenticated session exists for the user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Transport failure (offline, connection reset, DNS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The remote refused a single write.
    #[error("write failed for task {id}: {message}")]
    Write {
        /// The task whose write failed.
        id: TaskId,
        /// Error message.
        message: String,
    },

    /// The call did not complete in time.
    #[error("remote operation timed out")]
    Timeout,

    /// The remote rejected the request as invalid.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a per-record write error.
    pub fn write(id: TaskId, message: impl Into<String>) -> Self {
        Self::Write {
            id,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout)
    }
}
