//! # tasksync core
//!
//! Shared vocabulary for the tasksync workspace.
//!
//! This crate provides:
//! - The [`Task`] record and its creation/update shapes ([`TaskDraft`], [`TaskPatch`])
//! - Opaque identifiers ([`TaskId`], [`UserId`])
//! - Millisecond clocks ([`SystemClock`], [`ManualClock`])
//! - A multi-subscriber [`ChangeFeed`] used for local and remote notifications
//!
//! ## Key Invariants
//!
//! - A task id never changes after creation
//! - `updated_at` is the only input to conflict resolution
//! - `synced = true` means the local content matches the remote copy

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod feed;
mod id;
mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use feed::ChangeFeed;
pub use id::{TaskId, UserId};
pub use task::{ChangeKind, ChangeOrigin, Task, TaskChange, TaskDraft, TaskFilter, TaskPatch};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
