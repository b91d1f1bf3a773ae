//! Benchmark utilities.

use rand::Rng;
use tasksync_core::{Task, TaskDraft, TaskId, UserId};

/// The user every generated task belongs to.
pub fn bench_user() -> UserId {
    UserId::new("bench-user")
}

/// Generate a random title of the specified length.
pub fn random_title(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

/// Generate synced tasks with ids `task-0..count` and random timestamps.
pub fn generate_tasks(count: usize) -> Vec<Task> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let now = rng.gen_range(1_000..1_000_000);
            let mut task = Task::from_draft(
                TaskDraft::new(bench_user(), random_title(24)),
                TaskId::from(format!("task-{i}")),
                now,
            );
            task.synced = true;
            task
        })
        .collect()
}

/// Derive a remote snapshot from `local`: `changed_pct` percent of the
/// tasks come back newer and `new_count` extra tasks appear.
pub fn remote_snapshot(local: &[Task], changed_pct: u32, new_count: usize) -> Vec<Task> {
    let mut rng = rand::thread_rng();
    let mut remote: Vec<Task> = local
        .iter()
        .map(|task| {
            let mut copy = task.as_remote();
            if rng.gen_range(0..100) < changed_pct {
                copy.title = random_title(24);
                copy.updated_at += 1;
            }
            copy
        })
        .collect();

    for i in 0..new_count {
        let mut task = Task::from_draft(
            TaskDraft::new(bench_user(), random_title(24)),
            TaskId::from(format!("remote-{i}")),
            rng.gen_range(1_000..1_000_000),
        );
        task.synced = true;
        remote.push(task);
    }
    remote
}
