//! Published sync status for observers.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Phase of the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No run in progress and no recent result to show.
    #[default]
    Idle,
    /// A run is in progress.
    Syncing,
    /// The last run completed.
    Succeeded,
    /// The last run failed.
    Failed,
}

impl SyncStatus {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Succeeded | SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What observers see.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    /// Current phase.
    pub status: SyncStatus,
    /// Time of the last successful run (ms since epoch).
    pub last_synced_at: Option<i64>,
    /// Message of the last failed run; cleared when a new run starts.
    pub error: Option<String>,
    /// Local changes waiting to be pushed.
    pub pending_changes: usize,
}

struct StatusInner {
    tx: watch::Sender<SyncStatusSnapshot>,
    generation: AtomicU64,
}

/// A published-state cell holding the latest [`SyncStatusSnapshot`].
///
/// Observers read or subscribe; only the sync engine writes.
#[derive(Clone)]
pub struct SyncStatusStore {
    inner: Arc<StatusInner>,
}

impl SyncStatusStore {
    /// Creates an idle status store.
    pub fn new(last_synced_at: Option<i64>) -> Self {
        let (tx, _) = watch::channel(SyncStatusSnapshot {
            last_synced_at,
            ..SyncStatusSnapshot::default()
        });
        Self {
            inner: Arc::new(StatusInner {
                tx,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> SyncStatusSnapshot {
        self.inner.tx.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.inner.tx.subscribe()
    }

    /// Enters `Syncing` and invalidates any pending idle reset.
    pub(crate) fn begin(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.tx.send_modify(|s| {
            s.status = SyncStatus::Syncing;
            s.error = None;
        });
    }

    pub(crate) fn succeed(&self, synced_at: i64) {
        self.inner.tx.send_modify(|s| {
            s.status = SyncStatus::Succeeded;
            s.last_synced_at = Some(synced_at);
            s.error = None;
        });
    }

    pub(crate) fn fail(&self, message: String) {
        self.inner.tx.send_modify(|s| {
            s.status = SyncStatus::Failed;
            s.error = Some(message);
        });
    }

    pub(crate) fn set_pending_changes(&self, pending: usize) {
        self.inner.tx.send_if_modified(|s| {
            let changed = s.pending_changes != pending;
            s.pending_changes = pending;
            changed
        });
    }

    /// Returns the status to `Idle` after `dwell`, unless another run has
    /// started in the meantime.
    pub(crate) fn schedule_reset(&self, dwell: Duration) -> JoinHandle<()> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            store.reset_if_current(generation);
        })
    }

    fn reset_if_current(&self, generation: u64) {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.inner.tx.send_if_modified(|s| {
            if s.status.is_terminal() {
                s.status = SyncStatus::Idle;
                true
            } else {
                false
            }
        });
    }
}

impl Default for SyncStatusStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for SyncStatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStatusStore")
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let store = SyncStatusStore::new(Some(7));
        let snapshot = store.current();
        assert_eq!(snapshot.status, SyncStatus::Idle);
        assert_eq!(snapshot.last_synced_at, Some(7));
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn failure_keeps_last_success_time() {
        let store = SyncStatusStore::default();
        store.begin();
        store.succeed(100);
        store.begin();
        store.fail("fetch failed".into());

        let snapshot = store.current();
        assert_eq!(snapshot.status, SyncStatus::Failed);
        assert_eq!(snapshot.last_synced_at, Some(100));
        assert_eq!(snapshot.error.as_deref(), Some("fetch failed"));

        store.begin();
        assert_eq!(store.current().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn resets_to_idle_after_dwell() {
        let store = SyncStatusStore::default();
        store.begin();
        store.succeed(1);

        let reset = store.schedule_reset(Duration::from_secs(3));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.current().status, SyncStatus::Succeeded);

        reset.await.unwrap();
        assert_eq!(store.current().status, SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reset_is_ignored() {
        let store = SyncStatusStore::default();
        store.begin();
        store.fail("boom".into());
        let stale = store.schedule_reset(Duration::from_secs(3));

        store.begin();
        stale.await.unwrap();
        assert_eq!(store.current().status, SyncStatus::Syncing);
    }

    #[test]
    fn serializes_for_display() {
        let snapshot = SyncStatusSnapshot {
            status: SyncStatus::Succeeded,
            last_synced_at: Some(5),
            error: None,
            pending_changes: 2,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["lastSyncedAt"], 5);
        assert_eq!(json["pendingChanges"], 2);
    }
}
