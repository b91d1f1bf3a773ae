//! # tasksync storage
//!
//! The on-device task store.
//!
//! The store keeps every task of every signed-in user in memory and writes
//! a full snapshot through a [`SnapshotBackend`] after each mutation.
//! Backends are **opaque snapshot sinks**: they persist and return
//! [`Snapshot`] values and know nothing about dirty flags or deletes.
//!
//! ## Design Principles
//!
//! - Every user-facing mutation marks the record dirty (`synced = false`)
//! - Deletes are soft until the remote store confirms them
//! - `updated_at` strictly increases on every local mutation of a record
//! - A failed backend write rolls the in-memory change back
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - JSON snapshot file, replaced atomically on save
//!
//! ## Example
//!
//! ```rust
//! use tasksync_core::{TaskDraft, UserId};
//! use tasksync_storage::{LocalStore, TaskStore};
//!
//! let store = TaskStore::in_memory();
//! let user = UserId::new("alice");
//! let task = store.create(TaskDraft::new(user.clone(), "Buy milk")).unwrap();
//!
//! assert!(!task.synced);
//! assert_eq!(store.get_unsynced(&user).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod store;

pub use backend::{Snapshot, SnapshotBackend, SNAPSHOT_VERSION};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use store::{ChangeReceiver, LocalStore, TaskStore};
