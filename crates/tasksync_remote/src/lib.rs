//! # tasksync remote
//!
//! The server side of task synchronization, seen from the device.
//!
//! This crate provides:
//! - [`RemoteStore`], the async interface to the per-user remote collection
//! - [`AuthProvider`] and [`SessionAuth`], the source of the signed-in user
//! - [`InMemoryRemote`], a shared in-process remote with fault injection
//! - [`FileRemote`], a directory of per-user JSON files
//!
//! Remote operations fail with [`RemoteError`]. Live snapshot streams carry
//! their errors in-band.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod error;
mod file;
mod memory;
mod store;

pub use auth::{AuthProvider, SessionAuth};
pub use error::{RemoteError, RemoteResult};
pub use file::FileRemote;
pub use memory::InMemoryRemote;
pub use store::{RemoteStore, SnapshotStream};
