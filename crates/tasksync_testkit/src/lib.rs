//! # tasksync testkit
//!
//! Test utilities for tasksync.
//!
//! This crate provides:
//! - Task fixtures and store helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use tasksync_testkit::prelude::*;
//!
//! let task = TaskBuilder::new("t1").title("Buy milk").updated_at(100).synced().build();
//! assert!(task.synced);
//! assert_eq!(task.user_id, default_user());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
