//! Configuration for the sync engine.

use std::time::Duration;

/// How long a finished run's status stays visible before returning to idle.
pub const DEFAULT_STATUS_DWELL: Duration = Duration::from_secs(3);

/// Upper bound on any single remote call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Period of the automatic background sync.
pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration for sync operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Dwell time of `Succeeded`/`Failed` before the status resets to `Idle`.
    pub status_dwell: Duration,
    /// Timeout applied to every remote call.
    pub remote_timeout: Duration,
    /// Period of automatic syncs, or `None` to disable the timer.
    pub auto_sync_interval: Option<Duration>,
    /// Whether user edits trigger a sync while online.
    pub sync_on_local_change: bool,
    /// Whether live remote snapshots are applied as they arrive.
    pub live_updates: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default timings.
    pub fn new() -> Self {
        Self {
            status_dwell: DEFAULT_STATUS_DWELL,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            auto_sync_interval: Some(DEFAULT_AUTO_SYNC_INTERVAL),
            sync_on_local_change: true,
            live_updates: true,
        }
    }

    /// Sets the status dwell time.
    pub fn with_status_dwell(mut self, dwell: Duration) -> Self {
        self.status_dwell = dwell;
        self
    }

    /// Sets the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Sets the automatic sync period.
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Disables the automatic sync timer.
    pub fn without_auto_sync(mut self) -> Self {
        self.auto_sync_interval = None;
        self
    }

    /// Enables or disables syncing on local edits.
    pub fn with_sync_on_local_change(mut self, enabled: bool) -> Self {
        self.sync_on_local_change = enabled;
        self
    }

    /// Enables or disables the live remote subscription.
    pub fn with_live_updates(mut self, enabled: bool) -> Self {
        self.live_updates = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
