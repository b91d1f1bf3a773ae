//! In-memory snapshot backend for testing.

use crate::backend::{Snapshot, SnapshotBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Option<Snapshot>,
    saves: u64,
    fail_writes: bool,
}

/// An in-memory snapshot backend.
///
/// This backend keeps the last saved snapshot in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Clones share state, so a test can keep a handle to inspect saves or
/// inject write failures after the backend has been moved into a store.
///
/// # Example
///
/// ```rust
/// use tasksync_storage::{InMemoryBackend, Snapshot, SnapshotBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert!(backend.load().unwrap().is_none());
///
/// backend.save(&Snapshot::default()).unwrap();
/// assert_eq!(backend.save_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding a pre-existing snapshot.
    ///
    /// Useful for testing reload scenarios.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let backend = Self::default();
        backend.state.write().snapshot = Some(snapshot);
        backend
    }

    /// Returns a copy of the last saved snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.state.read().snapshot.clone()
    }

    /// Returns the number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.state.read().saves
    }

    /// Makes every following save fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.write().fail_writes = fail;
    }
}

impl SnapshotBackend for InMemoryBackend {
    fn load(&self) -> StorageResult<Option<Snapshot>> {
        Ok(self.state.read().snapshot.clone())
    }

    fn save(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.fail_writes {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        state.snapshot = Some(snapshot.clone());
        state.saves += 1;
        Ok(())
    }
}
