//! Task fixtures and store helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksync_core::{Task, TaskDraft, TaskId, UserId};
use tasksync_remote::{InMemoryRemote, SessionAuth};
use tasksync_storage::{FileBackend, TaskStore};
use tempfile::TempDir;

/// The user most fixtures belong to.
pub fn default_user() -> UserId {
    UserId::new("test-user")
}

/// A draft owned by `user`.
pub fn draft(user: &UserId, title: &str) -> TaskDraft {
    TaskDraft::new(user.clone(), title)
}

/// Builds tasks with explicit timestamps and flags.
///
/// Defaults: owned by [`default_user`], `created_at = updated_at = 1`,
/// dirty, not deleted.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// Starts a task with the given id.
    pub fn new(id: &str) -> Self {
        Self {
            task: Task::from_draft(
                TaskDraft::new(default_user(), format!("task {id}")),
                TaskId::from(id),
                1,
            ),
        }
    }

    /// Sets the owner.
    pub fn user(mut self, user: &UserId) -> Self {
        self.task.user_id = user.clone();
        self
    }

    /// Sets the title.
    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: &str) -> Self {
        self.task.description = Some(description.to_string());
        self
    }

    /// Sets the completion flag.
    pub fn completed(mut self, completed: bool) -> Self {
        self.task.completed = completed;
        self
    }

    /// Sets the reminder time.
    pub fn reminder_time(mut self, at: i64) -> Self {
        self.task.reminder_time = Some(at);
        self
    }

    /// Sets the creation time.
    pub fn created_at(mut self, at: i64) -> Self {
        self.task.created_at = at;
        self
    }

    /// Sets the modification time.
    pub fn updated_at(mut self, at: i64) -> Self {
        self.task.updated_at = at;
        self
    }

    /// Marks the task synced.
    pub fn synced(mut self) -> Self {
        self.task.synced = true;
        self
    }

    /// Marks the task soft-deleted (and therefore dirty).
    pub fn deleted(mut self) -> Self {
        self.task.is_deleted = true;
        self.task.synced = false;
        self
    }

    /// Returns the task.
    pub fn build(self) -> Task {
        self.task
    }
}

/// A local store, a remote and a session sharing one signed-in user.
pub struct TestStores {
    /// The signed-in user.
    pub user: UserId,
    /// The local store.
    pub local: Arc<TaskStore>,
    /// The remote; clones share its state.
    pub remote: InMemoryRemote,
    /// The session, already signed in as `user`.
    pub auth: Arc<SessionAuth>,
}

impl TestStores {
    /// Creates empty in-memory stores for [`default_user`].
    pub fn new() -> Self {
        Self::for_user(default_user())
    }

    /// Creates empty in-memory stores for `user`.
    pub fn for_user(user: UserId) -> Self {
        let auth = Arc::new(SessionAuth::signed_in(user.clone()));
        Self {
            local: Arc::new(TaskStore::in_memory()),
            remote: InMemoryRemote::with_auth(auth.clone()),
            auth,
            user,
        }
    }

    /// Creates a second device for the same user sharing this remote.
    pub fn second_device(&self) -> Self {
        Self {
            user: self.user.clone(),
            local: Arc::new(TaskStore::in_memory()),
            remote: self.remote.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// A file-backed task store in a temporary directory.
pub struct TempStore {
    /// The store.
    pub store: TaskStore,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempStore {
    /// Creates an empty file-backed store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("local").join("tasks.json");
        let backend =
            FileBackend::open_with_create_dirs(&path).expect("Failed to create file backend");
        Self {
            store: TaskStore::open(backend).expect("Failed to open task store"),
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the store and opens it again from its file, as after a restart.
    pub fn reopen(&mut self) {
        // Release the file lock before taking it again.
        self.store = TaskStore::in_memory();
        let backend = FileBackend::open(&self.path).expect("Failed to open file backend");
        self.store = TaskStore::open(backend).expect("Failed to reopen task store");
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempStore {
    type Target = TaskStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_storage::LocalStore;

    #[test]
    fn builder_defaults() {
        let task = TaskBuilder::new("a").build();
        assert_eq!(task.id, TaskId::from("a"));
        assert_eq!(task.user_id, default_user());
        assert!(!task.synced);
        assert!(!task.is_deleted);
    }

    #[test]
    fn deleted_is_dirty() {
        let task = TaskBuilder::new("a").synced().deleted().build();
        assert!(task.is_deleted);
        assert!(!task.synced);
    }

    #[test]
    fn temp_store_reopens() {
        let mut temp = TempStore::new();
        let task = temp.create(draft(&default_user(), "persist me")).unwrap();

        temp.reopen();
        assert_eq!(temp.get(&task.id, &default_user()).unwrap(), Some(task));
        assert!(temp.path().exists());
    }

    #[test]
    fn second_device_shares_remote() {
        let stores = TestStores::new();
        let other = stores.second_device();
        stores.remote.put_direct(TaskBuilder::new("x").synced().build());
        assert_eq!(other.remote.tasks(&other.user).len(), 1);
        assert!(other.local.is_empty());
    }
}
