//! Sync, pending and status commands.

use super::{print_tasks, CommandResult, Workspace};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tasksync_engine::{
    ManualConnectivity, NetworkState, SkipReason, SyncConfig, SyncEngine, SyncOutcome,
};
use tasksync_remote::{FileRemote, SessionAuth};
use tasksync_storage::LocalStore;
use tracing::debug;

/// Status report for the status command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The user.
    pub user: String,
    /// Time of the last successful sync (ms since epoch).
    pub last_synced_at: Option<i64>,
    /// Live tasks.
    pub tasks: usize,
    /// Unsynced edits plus pending deletes.
    pub pending_changes: usize,
    /// Remote directory.
    pub remote_dir: String,
}

/// Runs the sync command.
pub fn run(workspace: &Workspace, offline: bool, timeout_secs: u64) -> CommandResult {
    let network = if offline {
        NetworkState::OFFLINE
    } else {
        NetworkState::ONLINE
    };
    let auth = Arc::new(SessionAuth::signed_in(workspace.user.clone()));
    let remote = FileRemote::open(&workspace.remote_dir)?.with_auth(auth.clone());
    debug!(remote = %workspace.remote_dir.display(), "opened remote");

    let config = SyncConfig::new()
        .without_auto_sync()
        .with_remote_timeout(Duration::from_secs(timeout_secs));
    let engine = SyncEngine::new(
        config,
        workspace.local.clone(),
        Arc::new(remote),
        auth,
        Arc::new(ManualConnectivity::new(network)),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(engine.run_sync(&workspace.user))?;

    match outcome {
        SyncOutcome::Completed(report) => {
            println!("Sync complete in {} ms", report.duration.as_millis());
            println!("  Deleted:     {}", report.deleted);
            println!("  Pushed:      {}", report.pushed);
            println!("  Pulled:      {}", report.pulled.applied());
            if report.pulled.kept > 0 {
                println!("  Kept local:  {}", report.pulled.kept);
            }
            if report.push_failures > 0 {
                println!(
                    "  Failed:      {} (will retry on next sync)",
                    report.push_failures
                );
            }
        }
        SyncOutcome::Skipped(SkipReason::Offline) => {
            let pending = workspace.local.pending_count(&workspace.user)?;
            println!("Offline: {pending} change(s) stay queued");
        }
        SyncOutcome::Skipped(reason) => {
            println!("Sync skipped: {reason:?}");
        }
    }
    Ok(())
}

/// Runs the pending command.
pub fn pending(workspace: &Workspace, format: &str) -> CommandResult {
    let mut tasks = workspace.local.get_unsynced(&workspace.user)?;
    tasks.extend(workspace.local.get_pending_deletes(&workspace.user)?);
    print_tasks(&tasks, format)
}

/// Runs the status command.
pub fn status(workspace: &Workspace, format: &str) -> CommandResult {
    let report = StatusReport {
        user: workspace.user.to_string(),
        last_synced_at: workspace.local.last_synced_at()?,
        tasks: workspace.local.get_all(&workspace.user)?.len(),
        pending_changes: workspace.local.pending_count(&workspace.user)?,
        remote_dir: workspace.remote_dir.display().to_string(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("User:            {}", report.user);
            match report.last_synced_at {
                Some(at) => println!("Last synced at:  {at}"),
                None => println!("Last synced at:  never"),
            }
            println!("Tasks:           {}", report.tasks);
            println!("Pending changes: {}", report.pending_changes);
            println!("Remote:          {}", report.remote_dir);
        }
    }
    Ok(())
}
