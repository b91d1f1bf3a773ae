//! The task record and the shapes used to create, update and observe it.

use crate::id::{TaskId, UserId};
use serde::{Deserialize, Serialize};

/// A task, the unit of synchronization.
///
/// The serialized form uses the same camelCase field names as the remote
/// document, so a task can be written remotely field-for-field with `id`
/// as the document key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Immutable identifier, the join key between local and remote copies.
    pub id: TaskId,
    /// Owning user.
    pub user_id: UserId,
    /// Title shown to the user.
    pub title: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the task is done.
    #[serde(default)]
    pub completed: bool,
    /// Optional due date (ms since epoch).
    #[serde(default)]
    pub due_date: Option<i64>,
    /// Optional reminder time (ms since epoch).
    #[serde(default)]
    pub reminder_time: Option<i64>,
    /// Creation time (ms since epoch).
    pub created_at: i64,
    /// Last modification time (ms since epoch). Basis of last-write-wins.
    pub updated_at: i64,
    /// True iff the local revision is known to match the remote one.
    #[serde(default)]
    pub synced: bool,
    /// Soft-delete marker for a locally initiated deletion.
    #[serde(default)]
    pub is_deleted: bool,
}

impl Task {
    /// Builds a fresh, unsynced task from a draft.
    pub fn from_draft(draft: TaskDraft, id: TaskId, now: i64) -> Self {
        Self {
            id,
            user_id: draft.user_id,
            title: draft.title,
            description: draft.description,
            completed: draft.completed,
            due_date: draft.due_date,
            reminder_time: draft.reminder_time,
            created_at: now,
            updated_at: now,
            synced: false,
            is_deleted: false,
        }
    }

    /// Returns true if the task has local changes not yet confirmed remotely.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.synced
    }

    /// Compares the user-visible content and timestamps, ignoring the
    /// `synced` and `is_deleted` bookkeeping flags.
    pub fn same_content(&self, other: &Task) -> bool {
        self.id == other.id
            && self.user_id == other.user_id
            && self.title == other.title
            && self.description == other.description
            && self.completed == other.completed
            && self.due_date == other.due_date
            && self.reminder_time == other.reminder_time
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }

    /// Copies content fields and timestamps from `source`.
    ///
    /// The identifier, owner and bookkeeping flags are left untouched.
    pub fn copy_content_from(&mut self, source: &Task) {
        self.title.clone_from(&source.title);
        self.description.clone_from(&source.description);
        self.completed = source.completed;
        self.due_date = source.due_date;
        self.reminder_time = source.reminder_time;
        self.created_at = source.created_at;
        self.updated_at = source.updated_at;
    }

    /// Returns the shape of this task as the remote store keeps it.
    pub fn as_remote(&self) -> Task {
        Task {
            synced: true,
            is_deleted: false,
            ..self.clone()
        }
    }

    /// Returns true if the task passes the given list filter.
    pub fn matches(&self, filter: TaskFilter) -> bool {
        match filter {
            TaskFilter::All => true,
            TaskFilter::Active => !self.completed,
            TaskFilter::Completed => self.completed,
        }
    }
}

/// Fields supplied by the caller when creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Owning user.
    pub user_id: UserId,
    /// Title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Initial completion state.
    pub completed: bool,
    /// Optional due date (ms since epoch).
    pub due_date: Option<i64>,
    /// Optional reminder time (ms since epoch).
    pub reminder_time: Option<i64>,
}

impl TaskDraft {
    /// Creates a draft with only the required fields.
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the due date.
    pub fn with_due_date(mut self, due_date: i64) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets the reminder time.
    pub fn with_reminder_time(mut self, reminder_time: i64) -> Self {
        self.reminder_time = Some(reminder_time);
        self
    }

    /// Sets the completion state.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

/// A partial update of a task's content.
///
/// `None` leaves a field untouched. Optional fields use `Some(None)` to
/// clear the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear it.
    pub description: Option<Option<String>>,
    /// New completion state.
    pub completed: Option<bool>,
    /// New due date, or `Some(None)` to clear it.
    pub due_date: Option<Option<i64>>,
    /// New reminder time, or `Some(None)` to clear it.
    pub reminder_time: Option<Option<i64>>,
}

impl TaskPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets or clears the description.
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    /// Sets the completion state.
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Sets or clears the due date.
    pub fn due_date(mut self, due_date: Option<i64>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets or clears the reminder time.
    pub fn reminder_time(mut self, reminder_time: Option<i64>) -> Self {
        self.reminder_time = Some(reminder_time);
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.reminder_time.is_none()
    }

    /// Merges the patch into `task`. Timestamps and flags are the caller's job.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(reminder_time) = self.reminder_time {
            task.reminder_time = reminder_time;
        }
    }
}

/// List filter for task queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    /// Every task.
    #[default]
    All,
    /// Tasks not yet completed.
    Active,
    /// Completed tasks.
    Completed,
}

/// Type of local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A task was created.
    Created,
    /// A task's content changed.
    Updated,
    /// A task was soft-deleted.
    Deleted,
    /// A task was physically removed.
    Purged,
    /// A task was marked as synced.
    Synced,
    /// A remote copy was written locally.
    RemoteApplied,
}

/// Who caused a local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A user-facing mutation (create, update, delete).
    User,
    /// A write performed by the sync engine.
    Sync,
}

/// A change event emitted by the local store after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    /// The affected task.
    pub id: TaskId,
    /// The owning user.
    pub user_id: UserId,
    /// What happened.
    pub kind: ChangeKind,
    /// Who did it.
    pub origin: ChangeOrigin,
}

impl TaskChange {
    /// Creates a change event; the origin follows from the kind.
    pub fn new(id: TaskId, user_id: UserId, kind: ChangeKind) -> Self {
        let origin = match kind {
            ChangeKind::Created | ChangeKind::Updated | ChangeKind::Deleted => ChangeOrigin::User,
            ChangeKind::Purged | ChangeKind::Synced | ChangeKind::RemoteApplied => {
                ChangeOrigin::Sync
            }
        };
        Self {
            id,
            user_id,
            kind,
            origin,
        }
    }

    /// Returns true for user-facing mutations, the ones that should
    /// trigger an opportunistic sync.
    pub fn is_user_change(&self) -> bool {
        self.origin == ChangeOrigin::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::from_draft(
            TaskDraft::new(UserId::new("u1"), "Buy milk").with_reminder_time(5_000),
            TaskId::from("t1"),
            1_000,
        )
    }

    #[test]
    fn from_draft_starts_dirty() {
        let task = sample();
        assert_eq!(task.created_at, 1_000);
        assert_eq!(task.updated_at, 1_000);
        assert!(!task.synced);
        assert!(!task.is_deleted);
        assert!(task.is_dirty());
        assert_eq!(task.reminder_time, Some(5_000));
    }

    #[test]
    fn patch_merges_only_given_fields() {
        let mut task = sample();
        task.description = Some("2%".into());

        TaskPatch::new()
            .title("Buy oat milk")
            .reminder_time(None)
            .apply_to(&mut task);

        assert_eq!(task.title, "Buy oat milk");
        assert_eq!(task.description.as_deref(), Some("2%"));
        assert_eq!(task.reminder_time, None);
        assert!(!task.completed);
    }

    #[test]
    fn empty_patch() {
        assert!(TaskPatch::new().is_empty());
        assert!(!TaskPatch::new().completed(true).is_empty());
    }

    #[test]
    fn same_content_ignores_flags() {
        let a = sample();
        let mut b = a.clone();
        b.synced = true;
        assert!(a.same_content(&b));

        b.updated_at += 1;
        assert!(!a.same_content(&b));
    }

    #[test]
    fn copy_content_keeps_flags() {
        let mut local = sample();
        let mut remote = sample();
        remote.title = "Remote".into();
        remote.updated_at = 9_000;
        remote.synced = true;

        local.copy_content_from(&remote);
        assert_eq!(local.title, "Remote");
        assert_eq!(local.updated_at, 9_000);
        assert!(!local.synced);
    }

    #[test]
    fn serde_uses_camel_case() {
        let task = sample();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["reminderTime"], 5_000);
        assert_eq!(json["isDeleted"], false);

        // Remote documents may omit the bookkeeping flags.
        let doc = serde_json::json!({
            "id": "t9",
            "userId": "u1",
            "title": "From server",
            "createdAt": 1,
            "updatedAt": 2
        });
        let parsed: Task = serde_json::from_value(doc).unwrap();
        assert!(!parsed.synced);
        assert_eq!(parsed.description, None);
    }

    #[test]
    fn filters() {
        let mut task = sample();
        assert!(task.matches(TaskFilter::All));
        assert!(task.matches(TaskFilter::Active));
        assert!(!task.matches(TaskFilter::Completed));
        task.completed = true;
        assert!(task.matches(TaskFilter::Completed));
    }

    #[test]
    fn change_origin_follows_kind() {
        let user = UserId::new("u1");
        assert!(TaskChange::new(TaskId::from("a"), user.clone(), ChangeKind::Updated).is_user_change());
        assert!(!TaskChange::new(TaskId::from("a"), user, ChangeKind::Synced).is_user_change());
    }
}
