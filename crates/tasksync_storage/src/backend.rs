//! Snapshot backend trait definition.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use tasksync_core::Task;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The full persisted state of a task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version, see [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// Every stored task, soft-deleted ones included.
    pub tasks: Vec<Task>,
    /// Time of the last successful sync (ms since epoch).
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl Snapshot {
    /// Creates a snapshot in the current format.
    pub fn new(tasks: Vec<Task>, last_synced_at: Option<i64>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tasks,
            last_synced_at,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

/// A persistence backend for the task store.
///
/// Backends are **opaque snapshot sinks**. The store owns all task
/// semantics; a backend only has to hand back the last snapshot it saved.
///
/// # Invariants
///
/// - `load` returns exactly the snapshot most recently passed to `save`
/// - `load` returns `None` when nothing was ever saved
/// - A successful `save` is durable for the backend's notion of durability
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait SnapshotBackend: Send + Sync {
    /// Loads the last saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be read or parsed.
    fn load(&self) -> StorageResult<Option<Snapshot>>;

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written. The previous
    /// snapshot must remain loadable in that case.
    fn save(&mut self, snapshot: &Snapshot) -> StorageResult<()>;
}
