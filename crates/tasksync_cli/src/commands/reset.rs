//! Reset command implementation.

use super::{CommandResult, Workspace};
use tasksync_storage::LocalStore;

/// Runs the reset command.
///
/// Unpushed changes are lost; the next sync pulls everything again.
pub fn run(workspace: &Workspace, confirmed: bool) -> CommandResult {
    let pending = workspace.local.pending_count(&workspace.user)?;
    if !confirmed {
        println!(
            "This deletes every local task of {} ({pending} unpushed change(s)).",
            workspace.user
        );
        println!("Run again with --yes to confirm.");
        return Ok(());
    }

    workspace.local.clear_all()?;
    println!("Local store cleared");
    Ok(())
}
