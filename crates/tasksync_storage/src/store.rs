//! The local task store.

use crate::backend::{Snapshot, SnapshotBackend};
use crate::error::StorageResult;
use crate::memory::InMemoryBackend;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tasksync_core::{
    ChangeFeed, ChangeKind, Clock, SystemClock, Task, TaskChange, TaskDraft, TaskFilter, TaskId,
    TaskPatch, UserId,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Receiver half of a local change subscription. Drop it to unsubscribe.
pub type ChangeReceiver = UnboundedReceiver<TaskChange>;

/// The durable on-device record store for tasks.
///
/// All queries are scoped to one user. Every user-facing mutation
/// (`create`, `update`, `soft_delete`) marks the record dirty; only the
/// sync engine flips records back to synced.
///
/// Missing records are reported with `None` or `false`, never as errors.
/// Backend failures surface as [`crate::StorageError`].
pub trait LocalStore: Send + Sync {
    /// Returns all non-deleted tasks of the user.
    fn get_all(&self, user_id: &UserId) -> StorageResult<Vec<Task>>;

    /// Returns the task with the given id, soft-deleted records included.
    fn find(&self, id: &TaskId, user_id: &UserId) -> StorageResult<Option<Task>>;

    /// Returns tasks with local changes to push (`synced = false`, not deleted).
    fn get_unsynced(&self, user_id: &UserId) -> StorageResult<Vec<Task>>;

    /// Returns soft-deleted tasks whose deletion still has to be pushed.
    fn get_pending_deletes(&self, user_id: &UserId) -> StorageResult<Vec<Task>>;

    /// Creates a task from a draft. The new task is unsynced.
    fn create(&self, draft: TaskDraft) -> StorageResult<Task>;

    /// Merges `patch` into the task, bumps `updated_at` and marks it dirty.
    ///
    /// Returns `None` if the user has no such (non-deleted) task.
    fn update(&self, id: &TaskId, user_id: &UserId, patch: &TaskPatch)
        -> StorageResult<Option<Task>>;

    /// Marks the task deleted and dirty so the deletion can be pushed.
    ///
    /// Returns `false` if the task does not exist.
    fn soft_delete(&self, id: &TaskId, user_id: &UserId) -> StorageResult<bool>;

    /// Physically removes the task. Used after the remote confirmed the delete.
    fn purge(&self, id: &TaskId, user_id: &UserId) -> StorageResult<bool>;

    /// Marks the task synced without touching its content.
    fn mark_synced(&self, id: &TaskId) -> StorageResult<()>;

    /// Marks the task synced only if it still carries `updated_at`.
    ///
    /// Returns `false` if the task changed since that revision was read,
    /// leaving the newer edit dirty for the next push.
    fn mark_synced_if_unchanged(
        &self,
        id: &TaskId,
        user_id: &UserId,
        updated_at: i64,
    ) -> StorageResult<bool>;

    /// Writes a remote copy locally: inserts if absent, otherwise overwrites
    /// the content and marks the record synced.
    ///
    /// Returns `false` without writing if the local record is dirty.
    fn upsert_from_remote(&self, task: &Task) -> StorageResult<bool>;

    /// Batch form of [`mark_synced_if_unchanged`](Self::mark_synced_if_unchanged)
    /// for the `(id, updated_at)` revisions the remote acknowledged.
    ///
    /// Returns one flag per revision, in order.
    fn mark_all_synced_if_unchanged(
        &self,
        user_id: &UserId,
        revisions: &[(TaskId, i64)],
    ) -> StorageResult<Vec<bool>> {
        revisions
            .iter()
            .map(|(id, updated_at)| self.mark_synced_if_unchanged(id, user_id, *updated_at))
            .collect()
    }

    /// Batch form of [`upsert_from_remote`](Self::upsert_from_remote).
    ///
    /// Returns one flag per task, in order.
    fn upsert_all_from_remote(&self, tasks: &[Task]) -> StorageResult<Vec<bool>> {
        tasks.iter().map(|t| self.upsert_from_remote(t)).collect()
    }

    /// Removes every record of every user.
    fn clear_all(&self) -> StorageResult<()>;

    /// Returns the time of the last successful sync.
    fn last_synced_at(&self) -> StorageResult<Option<i64>>;

    /// Records the time of a successful sync.
    fn set_last_synced_at(&self, at: i64) -> StorageResult<()>;

    /// Subscribes to change events for every mutation.
    fn subscribe(&self) -> ChangeReceiver;

    /// Returns the non-deleted task with the given id.
    fn get(&self, id: &TaskId, user_id: &UserId) -> StorageResult<Option<Task>> {
        Ok(self.find(id, user_id)?.filter(|t| !t.is_deleted))
    }

    /// Returns the non-deleted tasks of the user that pass `filter`.
    fn get_filtered(&self, user_id: &UserId, filter: TaskFilter) -> StorageResult<Vec<Task>> {
        let mut tasks = self.get_all(user_id)?;
        tasks.retain(|t| t.matches(filter));
        Ok(tasks)
    }

    /// Returns the number of local changes waiting to be pushed.
    fn pending_count(&self, user_id: &UserId) -> StorageResult<usize> {
        Ok(self.get_unsynced(user_id)?.len() + self.get_pending_deletes(user_id)?.len())
    }
}

type Key = (UserId, TaskId);

/// What a conditional write decided for one record.
enum Step {
    /// Nothing to write; the flag is the caller's result.
    Skip(bool),
    /// Write this record; the caller's result is `true`.
    Write(Task),
}

fn mark_step(current: Option<&Task>, updated_at: i64) -> Step {
    match current {
        Some(t) if t.is_deleted || t.updated_at != updated_at => Step::Skip(false),
        Some(t) if t.synced => Step::Skip(true),
        Some(t) => {
            let mut task = t.clone();
            task.synced = true;
            Step::Write(task)
        }
        None => Step::Skip(false),
    }
}

fn remote_step(current: Option<&Task>, remote: &Task) -> Step {
    match current {
        None => Step::Write(remote.as_remote()),
        Some(local) if local.is_dirty() => Step::Skip(false),
        Some(local) if local.same_content(remote) => Step::Skip(true),
        Some(local) => {
            let mut task = local.clone();
            task.copy_content_from(remote);
            task.synced = true;
            task.is_deleted = false;
            Step::Write(task)
        }
    }
}

struct Table {
    tasks: BTreeMap<Key, Task>,
    last_synced_at: Option<i64>,
    backend: Box<dyn SnapshotBackend>,
}

impl Table {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.tasks.values().cloned().collect(), self.last_synced_at)
    }

    fn persist(&mut self) -> StorageResult<()> {
        let snapshot = self.snapshot();
        self.backend.save(&snapshot)
    }

    /// Replaces (or removes) one record and persists, restoring the
    /// previous record if the backend write fails.
    fn write(&mut self, key: Key, record: Option<Task>) -> StorageResult<()> {
        let previous = match record {
            Some(task) => self.tasks.insert(key.clone(), task),
            None => self.tasks.remove(&key),
        };

        if let Err(e) = self.persist() {
            match previous {
                Some(task) => self.tasks.insert(key, task),
                None => self.tasks.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Runs `step` for each item against the live table and persists once.
    /// Every record is restored if the backend write fails.
    ///
    /// Returns one flag per item and the records written.
    fn write_batch<T>(
        &mut self,
        items: impl IntoIterator<Item = (Key, T)>,
        step: impl Fn(Option<&Task>, T) -> Step,
    ) -> StorageResult<(Vec<bool>, Vec<Task>)> {
        let mut flags = Vec::new();
        let mut previous = Vec::new();
        let mut written = Vec::new();

        for (key, item) in items {
            match step(self.tasks.get(&key), item) {
                Step::Skip(flag) => flags.push(flag),
                Step::Write(task) => {
                    flags.push(true);
                    previous.push((key.clone(), self.tasks.insert(key, task.clone())));
                    written.push(task);
                }
            }
        }
        if written.is_empty() {
            return Ok((flags, written));
        }

        if let Err(e) = self.persist() {
            for (key, task) in previous.into_iter().rev() {
                match task {
                    Some(task) => self.tasks.insert(key, task),
                    None => self.tasks.remove(&key),
                };
            }
            return Err(e);
        }
        Ok((flags, written))
    }

    fn user_tasks<'a>(&'a self, user_id: &'a UserId) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .iter()
            .filter(move |((owner, _), _)| owner == user_id)
            .map(|(_, task)| task)
    }
}

/// The task store: an in-memory table persisted through a [`SnapshotBackend`].
///
/// Every mutation saves a full snapshot. The batch forms
/// ([`LocalStore::mark_all_synced_if_unchanged`] and
/// [`LocalStore::upsert_all_from_remote`]) save once per call, so a sync
/// phase costs one write instead of one per record.
///
/// # Thread Safety
///
/// The store is `Send + Sync`. Mutations are serialized by an internal lock
/// held across the backend write, so snapshots are saved in mutation order.
///
/// # Example
///
/// ```rust
/// use tasksync_core::{TaskDraft, TaskPatch, UserId};
/// use tasksync_storage::{LocalStore, TaskStore};
///
/// let store = TaskStore::in_memory();
/// let user = UserId::new("alice");
///
/// let task = store.create(TaskDraft::new(user.clone(), "Draft")).unwrap();
/// let edited = store
///     .update(&task.id, &user, &TaskPatch::new().title("Final"))
///     .unwrap()
///     .unwrap();
/// assert!(edited.updated_at > task.updated_at);
///
/// assert!(store.soft_delete(&task.id, &user).unwrap());
/// assert!(store.get_all(&user).unwrap().is_empty());
/// assert_eq!(store.get_pending_deletes(&user).unwrap().len(), 1);
/// ```
pub struct TaskStore {
    table: RwLock<Table>,
    feed: ChangeFeed<TaskChange>,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    /// Opens a store over `backend`, loading its last snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot load its snapshot.
    pub fn open(backend: impl SnapshotBackend + 'static) -> StorageResult<Self> {
        let snapshot = backend.load()?.unwrap_or_default();
        debug!(tasks = snapshot.tasks.len(), "opened task store");

        let tasks = snapshot
            .tasks
            .into_iter()
            .map(|t| ((t.user_id.clone(), t.id.clone()), t))
            .collect();

        Ok(Self {
            table: RwLock::new(Table {
                tasks,
                last_synced_at: snapshot.last_synced_at,
                backend: Box::new(backend),
            }),
            feed: ChangeFeed::new(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Creates an empty, non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            table: RwLock::new(Table {
                tasks: BTreeMap::new(),
                last_synced_at: None,
                backend: Box::new(InMemoryBackend::new()),
            }),
            feed: ChangeFeed::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `clock` for all following timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.table.read().tasks.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next `updated_at` for a record last modified at `previous`.
    fn next_revision(&self, previous: i64) -> i64 {
        self.clock.now_millis().max(previous.saturating_add(1))
    }

    fn emit(&self, task: &Task, kind: ChangeKind) {
        self.feed
            .emit(TaskChange::new(task.id.clone(), task.user_id.clone(), kind));
    }

    fn sorted(mut tasks: Vec<Task>) -> Vec<Task> {
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    fn collect(&self, user_id: &UserId, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let table = self.table.read();
        Self::sorted(table.user_tasks(user_id).filter(|t| keep(t)).cloned().collect())
    }
}

impl LocalStore for TaskStore {
    fn get_all(&self, user_id: &UserId) -> StorageResult<Vec<Task>> {
        Ok(self.collect(user_id, |t| !t.is_deleted))
    }

    fn find(&self, id: &TaskId, user_id: &UserId) -> StorageResult<Option<Task>> {
        let table = self.table.read();
        Ok(table.tasks.get(&(user_id.clone(), id.clone())).cloned())
    }

    fn get_unsynced(&self, user_id: &UserId) -> StorageResult<Vec<Task>> {
        Ok(self.collect(user_id, |t| !t.synced && !t.is_deleted))
    }

    fn get_pending_deletes(&self, user_id: &UserId) -> StorageResult<Vec<Task>> {
        Ok(self.collect(user_id, |t| t.is_deleted))
    }

    fn create(&self, draft: TaskDraft) -> StorageResult<Task> {
        let task = Task::from_draft(draft, TaskId::new(), self.clock.now_millis());
        {
            let mut table = self.table.write();
            let key = (task.user_id.clone(), task.id.clone());
            table.write(key, Some(task.clone()))?;
        }
        debug!(task = %task.id, user = %task.user_id, "created task");
        self.emit(&task, ChangeKind::Created);
        Ok(task)
    }

    fn update(
        &self,
        id: &TaskId,
        user_id: &UserId,
        patch: &TaskPatch,
    ) -> StorageResult<Option<Task>> {
        let updated = {
            let mut table = self.table.write();
            let key = (user_id.clone(), id.clone());
            let Some(current) = table.tasks.get(&key).filter(|t| !t.is_deleted) else {
                return Ok(None);
            };

            let mut task = current.clone();
            patch.apply_to(&mut task);
            task.updated_at = self.next_revision(current.updated_at);
            task.synced = false;

            table.write(key, Some(task.clone()))?;
            task
        };
        debug!(task = %id, user = %user_id, "updated task");
        self.emit(&updated, ChangeKind::Updated);
        Ok(Some(updated))
    }

    fn soft_delete(&self, id: &TaskId, user_id: &UserId) -> StorageResult<bool> {
        let deleted = {
            let mut table = self.table.write();
            let key = (user_id.clone(), id.clone());
            let Some(current) = table.tasks.get(&key) else {
                return Ok(false);
            };
            if current.is_deleted {
                return Ok(true);
            }

            let mut task = current.clone();
            task.is_deleted = true;
            task.synced = false;
            task.updated_at = self.next_revision(current.updated_at);

            table.write(key, Some(task.clone()))?;
            task
        };
        debug!(task = %id, user = %user_id, "soft-deleted task");
        self.emit(&deleted, ChangeKind::Deleted);
        Ok(true)
    }

    fn purge(&self, id: &TaskId, user_id: &UserId) -> StorageResult<bool> {
        let purged = {
            let mut table = self.table.write();
            let key = (user_id.clone(), id.clone());
            let Some(current) = table.tasks.get(&key).cloned() else {
                return Ok(false);
            };
            table.write(key, None)?;
            current
        };
        debug!(task = %id, user = %user_id, "purged task");
        self.emit(&purged, ChangeKind::Purged);
        Ok(true)
    }

    fn mark_synced(&self, id: &TaskId) -> StorageResult<()> {
        let marked = {
            let mut table = self.table.write();
            let keys: Vec<Key> = table
                .tasks
                .iter()
                .filter(|((_, task_id), task)| task_id == id && !task.synced)
                .map(|(key, _)| key.clone())
                .collect();

            let mut marked = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(mut task) = table.tasks.get(&key).cloned() {
                    task.synced = true;
                    table.write(key, Some(task.clone()))?;
                    marked.push(task);
                }
            }
            marked
        };
        for task in &marked {
            self.emit(task, ChangeKind::Synced);
        }
        Ok(())
    }

    fn mark_synced_if_unchanged(
        &self,
        id: &TaskId,
        user_id: &UserId,
        updated_at: i64,
    ) -> StorageResult<bool> {
        let flags = self.mark_all_synced_if_unchanged(user_id, &[(id.clone(), updated_at)])?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    fn upsert_from_remote(&self, remote: &Task) -> StorageResult<bool> {
        let flags = self.upsert_all_from_remote(std::slice::from_ref(remote))?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    fn mark_all_synced_if_unchanged(
        &self,
        user_id: &UserId,
        revisions: &[(TaskId, i64)],
    ) -> StorageResult<Vec<bool>> {
        let (flags, marked) = {
            let mut table = self.table.write();
            let items = revisions
                .iter()
                .map(|(id, updated_at)| ((user_id.clone(), id.clone()), *updated_at));
            table.write_batch(items, mark_step)?
        };
        for task in &marked {
            self.emit(task, ChangeKind::Synced);
        }
        Ok(flags)
    }

    fn upsert_all_from_remote(&self, tasks: &[Task]) -> StorageResult<Vec<bool>> {
        let (flags, written) = {
            let mut table = self.table.write();
            let items = tasks
                .iter()
                .map(|t| ((t.user_id.clone(), t.id.clone()), t));
            table.write_batch(items, remote_step)?
        };
        for task in &written {
            debug!(task = %task.id, user = %task.user_id, "applied remote task");
            self.emit(task, ChangeKind::RemoteApplied);
        }
        Ok(flags)
    }

    fn clear_all(&self) -> StorageResult<()> {
        let removed = {
            let mut table = self.table.write();
            let removed = std::mem::take(&mut table.tasks);
            let last_synced_at = table.last_synced_at.take();
            if let Err(e) = table.persist() {
                table.tasks = removed;
                table.last_synced_at = last_synced_at;
                return Err(e);
            }
            removed
        };
        for task in removed.values() {
            self.emit(task, ChangeKind::Purged);
        }
        Ok(())
    }

    fn last_synced_at(&self) -> StorageResult<Option<i64>> {
        Ok(self.table.read().last_synced_at)
    }

    fn set_last_synced_at(&self, at: i64) -> StorageResult<()> {
        let mut table = self.table.write();
        let previous = table.last_synced_at.replace(at);
        if let Err(e) = table.persist() {
            table.last_synced_at = previous;
            return Err(e);
        }
        Ok(())
    }

    fn subscribe(&self) -> ChangeReceiver {
        self.feed.subscribe()
    }
}
