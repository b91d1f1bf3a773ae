//! tasksync CLI
//!
//! A command-line task list backed by an offline-first local store.
//!
//! # Commands
//!
//! - `add` / `edit` / `done` / `delete` - Change tasks locally (always works offline)
//! - `list` / `show` - Read tasks
//! - `pending` - Show local changes not yet pushed
//! - `sync` - Push local changes and pull remote ones
//! - `status` - Show the last sync time and pending change count
//! - `reset` - Wipe the local store
//!
//! Two data directories sharing one `--remote-dir` behave like two devices
//! of the same user.

mod commands;

use clap::{Parser, Subcommand};
use commands::Workspace;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first task list.
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local stores
    #[arg(global = true, short, long, default_value = ".tasksync")]
    data_dir: PathBuf,

    /// Remote directory (defaults to <data-dir>/remote)
    #[arg(global = true, short, long)]
    remote_dir: Option<PathBuf>,

    /// User whose tasks to work with
    #[arg(global = true, short, long, default_value = "local-user")]
    user: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Task description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Due date (ms since epoch)
        #[arg(long)]
        due: Option<i64>,

        /// Reminder time (ms since epoch)
        #[arg(long)]
        remind: Option<i64>,
    },

    /// List tasks
    List {
        /// Which tasks to show (all, active, completed)
        #[arg(long, default_value = "all")]
        filter: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one task
    Show {
        /// Task id or unique id prefix
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Change a task
    Edit {
        /// Task id or unique id prefix
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short = 'D', long, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description
        #[arg(long)]
        clear_description: bool,

        /// New due date (ms since epoch)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<i64>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        /// New reminder time (ms since epoch)
        #[arg(long, conflicts_with = "clear_remind")]
        remind: Option<i64>,

        /// Remove the reminder
        #[arg(long)]
        clear_remind: bool,
    },

    /// Mark a task completed
    Done {
        /// Task id or unique id prefix
        id: String,

        /// Mark the task active again instead
        #[arg(long)]
        undo: bool,
    },

    /// Delete a task (pushed on the next sync)
    Delete {
        /// Task id or unique id prefix
        id: String,
    },

    /// Show local changes waiting to be pushed
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Synchronize with the remote
    Sync {
        /// Pretend the network is down
        #[arg(long)]
        offline: bool,

        /// Remote call timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Show sync status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete every local task of the user, synced or not
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("tasksync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("tasksync core v{}", tasksync_core::VERSION);
        return Ok(());
    }

    let workspace = Workspace::open(&cli.data_dir, cli.remote_dir.as_deref(), &cli.user)?;

    match cli.command {
        Commands::Add {
            title,
            description,
            due,
            remind,
        } => {
            commands::tasks::add(&workspace, title, description, due, remind)?;
        }
        Commands::List { filter, format } => {
            commands::tasks::list(&workspace, &filter, &format)?;
        }
        Commands::Show { id, format } => {
            commands::tasks::show(&workspace, &id, &format)?;
        }
        Commands::Edit {
            id,
            title,
            description,
            clear_description,
            due,
            clear_due,
            remind,
            clear_remind,
        } => {
            let edit = commands::tasks::Edit {
                title,
                description: commands::field_change(description, clear_description),
                due_date: commands::field_change(due, clear_due),
                reminder_time: commands::field_change(remind, clear_remind),
            };
            commands::tasks::edit(&workspace, &id, edit)?;
        }
        Commands::Done { id, undo } => {
            commands::tasks::done(&workspace, &id, !undo)?;
        }
        Commands::Delete { id } => {
            commands::tasks::delete(&workspace, &id)?;
        }
        Commands::Pending { format } => {
            commands::sync::pending(&workspace, &format)?;
        }
        Commands::Sync { offline, timeout } => {
            commands::sync::run(&workspace, offline, timeout)?;
        }
        Commands::Status { format } => {
            commands::sync::status(&workspace, &format)?;
        }
        Commands::Reset { yes } => {
            commands::reset::run(&workspace, yes)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
