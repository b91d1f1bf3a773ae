//! CLI command implementations.

pub mod reset;
pub mod sync;
pub mod tasks;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksync_core::{Task, TaskFilter, UserId};
use tasksync_storage::{FileBackend, LocalStore, TaskStore};

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The local store of one user plus where its remote lives.
pub struct Workspace {
    /// The user.
    pub user: UserId,
    /// The user's local store.
    pub local: Arc<TaskStore>,
    /// The remote directory.
    pub remote_dir: PathBuf,
}

impl Workspace {
    /// Opens `<data_dir>/local/<user>.json`, creating it if needed.
    pub fn open(data_dir: &Path, remote_dir: Option<&Path>, user: &str) -> CommandResult<Self> {
        if !is_valid_user(user) {
            return Err(format!(
                "Invalid user {user:?}: use letters, digits, '-', '_' or '.'"
            )
            .into());
        }
        let path = data_dir.join("local").join(format!("{user}.json"));
        let backend = FileBackend::open_with_create_dirs(&path)?;
        Ok(Self {
            user: UserId::new(user),
            local: Arc::new(TaskStore::open(backend)?),
            remote_dir: remote_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| data_dir.join("remote")),
        })
    }

    /// Finds a live task by full id or unique id prefix.
    pub fn resolve(&self, id: &str) -> CommandResult<Task> {
        let tasks = self.local.get_all(&self.user)?;
        if let Some(task) = tasks.iter().find(|t| t.id.as_str() == id) {
            return Ok(task.clone());
        }

        let mut matches = tasks.into_iter().filter(|t| t.id.as_str().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(task), None) if !id.is_empty() => Ok(task),
            (Some(_), Some(_)) => Err(format!("Task id prefix {id:?} is ambiguous").into()),
            _ => Err(format!("No task matching {id:?}").into()),
        }
    }
}

fn is_valid_user(user: &str) -> bool {
    !user.is_empty()
        && !user.starts_with('.')
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Turns a `--field value` / `--clear-field` pair into a patch entry.
pub fn field_change<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

/// Parses a `--filter` value.
pub fn parse_filter(filter: &str) -> CommandResult<TaskFilter> {
    match filter {
        "all" => Ok(TaskFilter::All),
        "active" => Ok(TaskFilter::Active),
        "completed" | "done" => Ok(TaskFilter::Completed),
        other => Err(format!("Unknown filter {other:?} (expected all, active or completed)").into()),
    }
}

/// Prints tasks as a table or as JSON.
pub fn print_tasks(tasks: &[Task], format: &str) -> CommandResult {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(tasks)?);
        }
        _ => {
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                println!("{}", task_line(task));
            }
        }
    }
    Ok(())
}

/// One-line summary of a task.
pub fn task_line(task: &Task) -> String {
    let check = if task.completed { "x" } else { " " };
    let mut flags = Vec::new();
    if task.is_deleted {
        flags.push("deleted");
    } else if !task.synced {
        flags.push("unsynced");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!("  ({})", flags.join(", "))
    };
    format!("[{check}] {}  {}{flags}", short_id(task), task.title)
}

fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::{TaskDraft, TaskId};

    fn workspace(dir: &Path) -> Workspace {
        Workspace::open(dir, None, "alice").unwrap()
    }

    #[test]
    fn open_lays_out_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        ws.local
            .create(TaskDraft::new(ws.user.clone(), "a"))
            .unwrap();

        assert!(dir.path().join("local").join("alice.json").exists());
        assert_eq!(ws.remote_dir, dir.path().join("remote"));
    }

    #[test]
    fn rejects_path_like_users() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Workspace::open(dir.path(), None, "../bob").is_err());
        assert!(Workspace::open(dir.path(), None, "").is_err());
        assert!(Workspace::open(dir.path(), None, ".hidden").is_err());
    }

    #[test]
    fn resolves_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        for id in ["abc123", "abd456"] {
            let mut task = Task::from_draft(
                TaskDraft::new(ws.user.clone(), id),
                TaskId::from(id),
                1,
            );
            task.synced = true;
            ws.local.upsert_from_remote(&task).unwrap();
        }

        assert_eq!(ws.resolve("abc").unwrap().id.as_str(), "abc123");
        assert_eq!(ws.resolve("abd456").unwrap().id.as_str(), "abd456");
        assert!(ws.resolve("ab").is_err());
        assert!(ws.resolve("zzz").is_err());
        assert!(ws.resolve("").is_err());
    }

    #[test]
    fn field_change_pairs() {
        assert_eq!(field_change(Some(5), false), Some(Some(5)));
        assert_eq!(field_change::<i64>(None, true), Some(None));
        assert_eq!(field_change::<i64>(None, false), None);
    }

    #[test]
    fn filters_parse() {
        assert_eq!(parse_filter("active").unwrap(), TaskFilter::Active);
        assert_eq!(parse_filter("done").unwrap(), TaskFilter::Completed);
        assert!(parse_filter("soon").is_err());
    }
}
