//! Local task commands. None of them touch the network.

use super::{parse_filter, print_tasks, task_line, CommandResult, Workspace};
use tasksync_core::{Task, TaskDraft, TaskPatch};
use tasksync_storage::LocalStore;

/// Field changes requested by `edit`. `Some(None)` clears a field.
#[derive(Debug, Default)]
pub struct Edit {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New due date.
    pub due_date: Option<Option<i64>>,
    /// New reminder time.
    pub reminder_time: Option<Option<i64>>,
}

impl Edit {
    fn into_patch(self) -> TaskPatch {
        let mut patch = TaskPatch::new();
        if let Some(title) = self.title {
            patch = patch.title(title);
        }
        if let Some(description) = self.description {
            patch = patch.description(description);
        }
        if let Some(due_date) = self.due_date {
            patch = patch.due_date(due_date);
        }
        if let Some(reminder_time) = self.reminder_time {
            patch = patch.reminder_time(reminder_time);
        }
        patch
    }
}

/// Runs the add command.
pub fn add(
    workspace: &Workspace,
    title: String,
    description: Option<String>,
    due_date: Option<i64>,
    reminder_time: Option<i64>,
) -> CommandResult {
    if title.trim().is_empty() {
        return Err("Task title must not be empty".into());
    }

    let mut draft = TaskDraft::new(workspace.user.clone(), title);
    if let Some(description) = description {
        draft = draft.with_description(description);
    }
    if let Some(due_date) = due_date {
        draft = draft.with_due_date(due_date);
    }
    if let Some(reminder_time) = reminder_time {
        draft = draft.with_reminder_time(reminder_time);
    }

    let task = workspace.local.create(draft)?;
    println!("Created {}", task.id);
    Ok(())
}

/// Runs the list command.
pub fn list(workspace: &Workspace, filter: &str, format: &str) -> CommandResult {
    let tasks = workspace
        .local
        .get_filtered(&workspace.user, parse_filter(filter)?)?;
    print_tasks(&tasks, format)
}

/// Runs the show command.
pub fn show(workspace: &Workspace, id: &str, format: &str) -> CommandResult {
    let task = workspace.resolve(id)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&task)?),
        _ => print_task(&task),
    }
    Ok(())
}

/// Runs the edit command.
pub fn edit(workspace: &Workspace, id: &str, edit: Edit) -> CommandResult {
    let patch = edit.into_patch();
    if patch.is_empty() {
        return Err("Nothing to change".into());
    }
    if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
        return Err("Task title must not be empty".into());
    }
    update(workspace, id, &patch)
}

/// Runs the done command.
pub fn done(workspace: &Workspace, id: &str, completed: bool) -> CommandResult {
    update(workspace, id, &TaskPatch::new().completed(completed))
}

/// Runs the delete command.
pub fn delete(workspace: &Workspace, id: &str) -> CommandResult {
    let task = workspace.resolve(id)?;
    workspace.local.soft_delete(&task.id, &workspace.user)?;
    println!("Deleted {}", task.id);
    Ok(())
}

fn update(workspace: &Workspace, id: &str, patch: &TaskPatch) -> CommandResult {
    let task = workspace.resolve(id)?;
    let updated = workspace
        .local
        .update(&task.id, &workspace.user, patch)?
        .ok_or_else(|| format!("Task {} disappeared", task.id))?;
    println!("{}", task_line(&updated));
    Ok(())
}

fn print_task(task: &Task) {
    println!("Task {}", task.id);
    println!("  Title:       {}", task.title);
    if let Some(description) = &task.description {
        println!("  Description: {description}");
    }
    println!("  Completed:   {}", if task.completed { "yes" } else { "no" });
    if let Some(due_date) = task.due_date {
        println!("  Due:         {due_date}");
    }
    if let Some(reminder_time) = task.reminder_time {
        println!("  Reminder:    {reminder_time}");
    }
    println!("  Created:     {}", task.created_at);
    println!("  Updated:     {}", task.updated_at);
    println!("  Synced:      {}", if task.synced { "yes" } else { "no" });
}
