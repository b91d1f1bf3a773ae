//! Property-based test generators using proptest.
//!
//! Provides strategies for generating tasks and sequences of user edits.

use proptest::prelude::*;
use tasksync_core::{Task, TaskDraft, TaskId, TaskPatch, UserId};
use tasksync_storage::{LocalStore, StorageResult};

use crate::fixtures::default_user;

/// Strategy for generating task ids.
pub fn task_id_strategy() -> impl Strategy<Value = TaskId> {
    "[a-z0-9]{1,12}".prop_map(TaskId::from)
}

/// Strategy for generating task titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,31}"
}

/// Strategy for generating millisecond timestamps.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    1_000i64..1_000_000
}

/// Strategy for generating remote tasks of [`default_user`].
pub fn remote_task_strategy() -> impl Strategy<Value = Task> {
    (
        task_id_strategy(),
        title_strategy(),
        any::<bool>(),
        proptest::option::of(timestamp_strategy()),
        timestamp_strategy(),
    )
        .prop_map(|(id, title, completed, reminder_time, updated_at)| {
            let mut task = Task::from_draft(
                TaskDraft::new(default_user(), title).with_completed(completed),
                id,
                1,
            );
            task.reminder_time = reminder_time;
            task.updated_at = updated_at;
            task.as_remote()
        })
}

/// A remote snapshot: tasks with distinct ids.
pub fn remote_snapshot_strategy(max: usize) -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(remote_task_strategy(), 0..max).prop_map(|mut tasks| {
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks.dedup_by(|a, b| a.id == b.id);
        tasks
    })
}

/// A user-facing edit. Existing tasks are addressed by index modulo the
/// number of live tasks at the time the edit is applied.
#[derive(Debug, Clone)]
pub enum TaskOperation {
    /// Create a task.
    Create {
        /// Title of the new task.
        title: String,
    },
    /// Change the title of an existing task.
    Rename {
        /// Index of the target task.
        index: usize,
        /// New title.
        title: String,
    },
    /// Toggle completion of an existing task.
    Toggle {
        /// Index of the target task.
        index: usize,
    },
    /// Soft-delete an existing task.
    Delete {
        /// Index of the target task.
        index: usize,
    },
}

/// Strategy for generating task operations.
pub fn task_operation_strategy() -> impl Strategy<Value = TaskOperation> {
    prop_oneof![
        3 => title_strategy().prop_map(|title| TaskOperation::Create { title }),
        2 => (any::<usize>(), title_strategy())
            .prop_map(|(index, title)| TaskOperation::Rename { index, title }),
        2 => any::<usize>().prop_map(|index| TaskOperation::Toggle { index }),
        1 => any::<usize>().prop_map(|index| TaskOperation::Delete { index }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TaskOperation>> {
    prop::collection::vec(task_operation_strategy(), min_ops..max_ops)
}

/// Applies an operation through the store's user-facing API.
///
/// Operations addressing an existing task are no-ops when the user has none.
pub fn apply_operation(
    store: &dyn LocalStore,
    user: &UserId,
    operation: &TaskOperation,
) -> StorageResult<()> {
    let live = store.get_all(user)?;
    let pick = |index: usize| live.get(index % live.len().max(1)).map(|t| t.id.clone());

    match operation {
        TaskOperation::Create { title } => {
            store.create(TaskDraft::new(user.clone(), title.clone()))?;
        }
        TaskOperation::Rename { index, title } => {
            if let Some(id) = pick(*index) {
                store.update(&id, user, &TaskPatch::new().title(title.clone()))?;
            }
        }
        TaskOperation::Toggle { index } => {
            if let Some(task) = live.get(index % live.len().max(1)) {
                store.update(&task.id, user, &TaskPatch::new().completed(!task.completed))?;
            }
        }
        TaskOperation::Delete { index } => {
            if let Some(id) = pick(*index) {
                store.soft_delete(&id, user)?;
            }
        }
    }
    Ok(())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
