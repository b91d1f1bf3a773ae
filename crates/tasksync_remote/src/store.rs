//! The remote store abstraction.

use crate::error::RemoteResult;
use async_trait::async_trait;
use tasksync_core::{Task, TaskId, UserId};
use tokio::sync::mpsc::UnboundedReceiver;

/// A stream of live full-list snapshots for one user.
///
/// Errors are delivered in-band. Dropping the receiver unsubscribes.
pub type SnapshotStream = UnboundedReceiver<RemoteResult<Vec<Task>>>;

/// The server-side, per-user task collection.
///
/// Documents are keyed by task id under a per-user namespace and hold the
/// task's content and timestamps. Records returned by the remote always come
/// back with `synced = true` and `is_deleted = false`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Writes the full task, overwriting any existing document.
    ///
    /// Fails with `NotAuthenticated` if there is no session for the task's
    /// owner and with `Network` on transport failure.
    async fn upsert(&self, task: &Task) -> RemoteResult<()>;

    /// Removes the document. Deleting a missing document succeeds.
    async fn delete(&self, user_id: &UserId, id: &TaskId) -> RemoteResult<()>;

    /// Returns every document of the user.
    async fn fetch_all(&self, user_id: &UserId) -> RemoteResult<Vec<Task>>;

    /// Subscribes to live snapshots of the user's collection.
    fn subscribe(&self, user_id: &UserId) -> SnapshotStream;
}
