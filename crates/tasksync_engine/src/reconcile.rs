//! Last-write-wins reconciliation of a remote snapshot into the local store.
//!
//! For each remote task `r` and its local copy `l` (soft-deleted records
//! included):
//! - no local copy: insert `r`
//! - `r.updated_at > l.updated_at` and `l` is synced: overwrite with `r`
//! - otherwise: keep `l`; equal timestamps favour the local copy and a dirty
//!   local copy always wins until it has been pushed
//!
//! Planning is pure; [`apply`] performs the writes.

use std::collections::HashMap;
use tasksync_core::{Task, TaskId};
use tasksync_storage::{LocalStore, StorageResult};

/// Why a local copy was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// The local copy has unpushed changes.
    LocalDirty,
    /// The remote copy is not strictly newer.
    NotNewer,
}

/// The decision for one remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No local copy exists.
    Insert(Task),
    /// The remote copy replaces the local content.
    Overwrite(Task),
    /// The local copy stays as it is.
    Keep {
        /// The task concerned.
        id: TaskId,
        /// Why nothing was written.
        reason: KeepReason,
    },
}

/// Decides what to do with one remote task.
pub fn resolve(local: Option<&Task>, remote: Task) -> Resolution {
    match local {
        None => Resolution::Insert(remote),
        Some(local) if local.is_dirty() => Resolution::Keep {
            id: remote.id,
            reason: KeepReason::LocalDirty,
        },
        Some(local) if remote.updated_at > local.updated_at => Resolution::Overwrite(remote),
        Some(_) => Resolution::Keep {
            id: remote.id,
            reason: KeepReason::NotNewer,
        },
    }
}

/// Plans the reconciliation of `remote` against the user's `local` records.
///
/// `local` must contain soft-deleted records as well, so a pending delete
/// is neither resurrected nor duplicated by the pull.
pub fn plan(local: &[Task], remote: Vec<Task>) -> Vec<Resolution> {
    let by_id: HashMap<&TaskId, &Task> = local.iter().map(|t| (&t.id, t)).collect();
    remote
        .into_iter()
        .map(|r| {
            let l = by_id.get(&r.id).copied();
            resolve(l, r)
        })
        .collect()
}

/// Counts of what a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Remote tasks inserted locally.
    pub inserted: usize,
    /// Local tasks overwritten by newer remote copies.
    pub overwritten: usize,
    /// Remote tasks that left the local copy untouched.
    pub kept: usize,
}

impl ReconcileSummary {
    /// Number of local writes performed.
    pub fn applied(&self) -> usize {
        self.inserted + self.overwritten
    }
}

/// Applies a plan to the local store with a single batched write.
///
/// A planned write is skipped (and counted as kept) if the store refuses
/// it because the user edited the record after planning.
pub fn apply(store: &dyn LocalStore, plan: Vec<Resolution>) -> StorageResult<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    let mut writes = Vec::new();
    let mut inserts = Vec::new();
    for resolution in plan {
        match resolution {
            Resolution::Insert(task) => {
                writes.push(task);
                inserts.push(true);
            }
            Resolution::Overwrite(task) => {
                writes.push(task);
                inserts.push(false);
            }
            Resolution::Keep { .. } => summary.kept += 1,
        }
    }

    // A record dirtied since planning is refused by the store and kept.
    let applied = store.upsert_all_from_remote(&writes)?;
    for (insert, applied) in inserts.into_iter().zip(applied) {
        match (insert, applied) {
            (_, false) => summary.kept += 1,
            (true, true) => summary.inserted += 1,
            (false, true) => summary.overwritten += 1,
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::{TaskDraft, TaskPatch, UserId};
    use tasksync_storage::{InMemoryBackend, TaskStore};

    fn task(id: &str, updated_at: i64, synced: bool) -> Task {
        let mut task = Task::from_draft(
            TaskDraft::new(UserId::new("u1"), format!("task {id}")),
            TaskId::from(id),
            1,
        );
        task.updated_at = updated_at;
        task.synced = synced;
        task
    }

    #[test]
    fn absent_locally_inserts() {
        let remote = task("a", 10, true);
        assert_eq!(resolve(None, remote.clone()), Resolution::Insert(remote));
    }

    #[test]
    fn newer_remote_overwrites_synced_local() {
        let local = task("a", 90, true);
        let remote = task("a", 100, true);
        assert_eq!(
            resolve(Some(&local), remote.clone()),
            Resolution::Overwrite(remote)
        );
    }

    #[test]
    fn dirty_local_is_kept_whatever_the_timestamps() {
        let local = task("a", 1, false);
        let remote = task("a", 1_000, true);
        assert_eq!(
            resolve(Some(&local), remote),
            Resolution::Keep {
                id: TaskId::from("a"),
                reason: KeepReason::LocalDirty
            }
        );
    }

    #[test]
    fn equal_timestamps_favour_local() {
        let local = task("a", 50, true);
        let remote = task("a", 50, true);
        assert!(matches!(
            resolve(Some(&local), remote),
            Resolution::Keep {
                reason: KeepReason::NotNewer,
                ..
            }
        ));
    }

    #[test]
    fn older_remote_is_ignored() {
        let local = task("a", 50, true);
        assert!(matches!(
            resolve(Some(&local), task("a", 49, true)),
            Resolution::Keep { .. }
        ));
    }

    #[test]
    fn pending_delete_is_not_resurrected() {
        let mut deleted = task("a", 10, false);
        deleted.is_deleted = true;

        let resolutions = plan(&[deleted], vec![task("a", 500, true)]);
        assert!(matches!(
            resolutions[0],
            Resolution::Keep {
                reason: KeepReason::LocalDirty,
                ..
            }
        ));
    }

    #[test]
    fn plan_covers_every_remote_task() {
        let local = vec![task("a", 10, true), task("b", 10, false)];
        let remote = vec![task("a", 20, true), task("b", 20, true), task("c", 5, true)];

        let resolutions = plan(&local, remote);
        assert!(matches!(resolutions[0], Resolution::Overwrite(_)));
        assert!(matches!(resolutions[1], Resolution::Keep { .. }));
        assert!(matches!(resolutions[2], Resolution::Insert(_)));
    }

    #[test]
    fn apply_counts_writes() {
        let store = TaskStore::in_memory();
        let user = UserId::new("u1");
        let existing = store.create(TaskDraft::new(user.clone(), "local")).unwrap();
        store.mark_synced(&existing.id).unwrap();

        let mut newer = existing.as_remote();
        newer.title = "remote".into();
        newer.updated_at += 10;

        let resolutions = vec![
            Resolution::Insert(task("fresh", 3, true)),
            Resolution::Overwrite(newer),
            Resolution::Keep {
                id: TaskId::from("x"),
                reason: KeepReason::NotNewer,
            },
        ];
        let summary = apply(&store, resolutions).unwrap();

        assert_eq!(
            summary,
            ReconcileSummary {
                inserted: 1,
                overwritten: 1,
                kept: 1
            }
        );
        assert_eq!(summary.applied(), 2);
        assert_eq!(store.get(&existing.id, &user).unwrap().unwrap().title, "remote");
    }

    #[test]
    fn apply_saves_once_for_whole_plan() {
        let backend = InMemoryBackend::new();
        let store = TaskStore::open(backend.clone()).unwrap();
        let resolutions = (0..100)
            .map(|i| Resolution::Insert(task(&format!("r{i}"), 3, true)))
            .collect();

        let summary = apply(&store, resolutions).unwrap();

        assert_eq!(summary.inserted, 100);
        assert_eq!(backend.save_count(), 1);
        assert_eq!(apply(&store, Vec::new()).unwrap(), ReconcileSummary::default());
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn apply_skips_records_edited_after_planning() {
        let store = TaskStore::in_memory();
        let user = UserId::new("u1");
        let existing = store.create(TaskDraft::new(user.clone(), "local")).unwrap();
        store.mark_synced(&existing.id).unwrap();

        let mut newer = existing.as_remote();
        newer.updated_at += 10;
        let resolutions = plan(&store.get_all(&user).unwrap(), vec![newer]);

        store
            .update(&existing.id, &user, &TaskPatch::new().title("edited meanwhile"))
            .unwrap();
        let summary = apply(&store, resolutions).unwrap();

        assert_eq!(summary.kept, 1);
        assert_eq!(
            store.get(&existing.id, &user).unwrap().unwrap().title,
            "edited meanwhile"
        );
    }
}
