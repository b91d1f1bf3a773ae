//! # tasksync engine
//!
//! Offline-first synchronization between a local task store and a remote,
//! per-user task store.
//!
//! This crate provides:
//! - The sync state machine (idle → syncing → succeeded/failed → idle)
//! - Push of local deletes and edits, pull with last-write-wins reconciliation
//! - A published status cell for UI observers
//! - Connectivity monitoring
//! - A background driver reacting to connectivity, local edits, sign-in,
//!   live remote snapshots and a timer
//!
//! ## Architecture
//!
//! Each run is **push-then-pull**:
//! 1. Push soft deletes, purging each record once the remote confirmed it
//! 2. Push dirty records, marking each synced once the remote confirmed it
//! 3. Fetch the remote snapshot and reconcile it into the local store
//!
//! ## Key Invariants
//!
//! - At most one run per engine at a time; concurrent requests are dropped
//! - A pull never overwrites a record with unpushed local changes
//! - A remote copy wins only with a strictly newer `updated_at`
//! - One failing record never blocks the others
//! - Every remote call is bounded by a timeout

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod driver;
mod engine;
mod error;
pub mod reconcile;
mod status;

pub use config::{
    SyncConfig, DEFAULT_AUTO_SYNC_INTERVAL, DEFAULT_REMOTE_TIMEOUT, DEFAULT_STATUS_DWELL,
};
pub use connectivity::{ConnectivityMonitor, ManualConnectivity, NetworkState};
pub use driver::{AutoSync, AutoSyncHandle};
pub use engine::{SkipReason, SyncEngine, SyncOutcome, SyncReport, SyncStats};
pub use error::{SyncError, SyncResult};
pub use reconcile::ReconcileSummary;
pub use status::{SyncStatus, SyncStatusSnapshot, SyncStatusStore};
