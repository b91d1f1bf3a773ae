//! The sync engine.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use crate::reconcile::{self, ReconcileSummary};
use crate::status::SyncStatusStore;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasksync_core::{Clock, SystemClock, Task, UserId};
use tasksync_remote::{AuthProvider, RemoteError, RemoteResult, RemoteStore};
use tasksync_storage::LocalStore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a run did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run (or snapshot application) holds the single-flight guard.
    InProgress,
    /// The network is down or the internet unreachable.
    Offline,
    /// The user has no authenticated session.
    NotAuthenticated,
}

/// Result of a call to [`SyncEngine::run_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run went through push and pull.
    Completed(SyncReport),
    /// Nothing was done; status is unchanged.
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// Returns the report of a completed run.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }

    /// Returns true if the run was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped(_))
    }
}

/// What one completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Deletions pushed and purged locally.
    pub deleted: usize,
    /// Tasks pushed and marked synced.
    pub pushed: usize,
    /// Tasks pushed but edited again during the push; they stay dirty.
    pub superseded: usize,
    /// Per-record remote failures; those records stay dirty.
    pub push_failures: usize,
    /// Outcome of the pull.
    pub pulled: ReconcileSummary,
    /// Completion time (ms since epoch).
    pub synced_at: i64,
    /// Wall time spent in the run.
    pub duration: Duration,
}

/// Cumulative counters across runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that completed.
    pub cycles_completed: u64,
    /// Runs that failed.
    pub cycles_failed: u64,
    /// Tasks pushed.
    pub tasks_pushed: u64,
    /// Deletions pushed.
    pub tasks_deleted: u64,
    /// Remote tasks written locally (by runs and live snapshots).
    pub tasks_pulled: u64,
    /// Per-record push failures.
    pub push_failures: u64,
    /// Time of the last completed run (ms since epoch).
    pub last_sync_time: Option<i64>,
    /// Last run failure.
    pub last_error: Option<String>,
}

/// Single-flight guard over the engine's in-progress flag.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates push and pull between a local and a remote task store.
///
/// The engine is the only component that clears dirty flags or purges
/// records. All collaborators are injected, so tests can substitute any of
/// them.
///
/// At most one run executes at a time; a run requested while another is in
/// flight returns [`SkipReason::InProgress`] immediately instead of queueing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tasksync_core::{TaskDraft, UserId};
/// use tasksync_engine::{ManualConnectivity, SyncConfig, SyncEngine, SyncOutcome};
/// use tasksync_remote::{InMemoryRemote, SessionAuth};
/// use tasksync_storage::{LocalStore, TaskStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let user = UserId::new("alice");
/// let local = Arc::new(TaskStore::in_memory());
/// let remote = Arc::new(InMemoryRemote::new());
/// let engine = SyncEngine::new(
///     SyncConfig::default(),
///     local.clone(),
///     remote.clone(),
///     Arc::new(SessionAuth::signed_in(user.clone())),
///     Arc::new(ManualConnectivity::online()),
/// );
///
/// local.create(TaskDraft::new(user.clone(), "Buy milk")).unwrap();
/// let outcome = engine.run_sync(&user).await.unwrap();
///
/// assert_eq!(outcome.report().unwrap().pushed, 1);
/// assert_eq!(remote.tasks(&user).len(), 1);
/// # }
/// ```
pub struct SyncEngine {
    config: SyncConfig,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    status: SyncStatusStore,
    stats: RwLock<SyncStats>,
    in_progress: AtomicBool,
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        let last_synced_at = local.last_synced_at().unwrap_or_else(|e| {
            warn!(error = %e, "could not read last sync time");
            None
        });
        Self {
            config,
            local,
            remote,
            auth,
            connectivity,
            clock: Arc::new(SystemClock),
            status: SyncStatusStore::new(last_synced_at),
            stats: RwLock::new(SyncStats::default()),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Uses `clock` for sync timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the status store observers read from.
    pub fn status(&self) -> &SyncStatusStore {
        &self.status
    }

    /// Returns a copy of the cumulative counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a run or snapshot application is in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Returns the local store.
    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Returns the authentication provider.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Returns the connectivity monitor.
    pub fn connectivity(&self) -> &Arc<dyn ConnectivityMonitor> {
        &self.connectivity
    }

    /// Recomputes the pending change count shown in the status.
    pub fn refresh_pending(&self, user_id: &UserId) -> SyncResult<usize> {
        let pending = self.local.pending_count(user_id)?;
        self.status.set_pending_changes(pending);
        Ok(pending)
    }

    /// Runs one sync: push deletes, push upserts, then pull and reconcile.
    ///
    /// Returns `Skipped` without touching the status when another run is in
    /// flight, when offline, or when `user_id` is not signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fetch or the local store fails. The
    /// status then moves to `Failed` with the error message.
    pub async fn run_sync(&self, user_id: &UserId) -> SyncResult<SyncOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.in_progress) else {
            debug!(user = %user_id, "sync already in progress");
            return Ok(SyncOutcome::Skipped(SkipReason::InProgress));
        };

        if !self.connectivity.is_online() {
            debug!(user = %user_id, "offline, skipping sync");
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        if !self.auth.is_signed_in_as(user_id) {
            debug!(user = %user_id, "not signed in, skipping sync");
            return Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        }

        self.status.begin();
        info!(user = %user_id, "sync started");
        let started = Instant::now();

        let result = self.sync_cycle(user_id, started).await;

        match &result {
            Ok(report) => {
                self.status.succeed(report.synced_at);
                info!(
                    user = %user_id,
                    deleted = report.deleted,
                    pushed = report.pushed,
                    push_failures = report.push_failures,
                    inserted = report.pulled.inserted,
                    overwritten = report.pulled.overwritten,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync succeeded"
                );
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.tasks_pushed += report.pushed as u64;
                stats.tasks_deleted += report.deleted as u64;
                stats.tasks_pulled += report.pulled.applied() as u64;
                stats.push_failures += report.push_failures as u64;
                stats.last_sync_time = Some(report.synced_at);
                stats.last_error = None;
            }
            Err(e) => {
                error!(user = %user_id, error = %e, "sync failed");
                self.status.fail(e.to_string());
                let mut stats = self.stats.write();
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
            }
        }

        if let Err(e) = self.refresh_pending(user_id) {
            warn!(user = %user_id, error = %e, "could not count pending changes");
        }
        self.status.schedule_reset(self.config.status_dwell);

        result.map(SyncOutcome::Completed)
    }

    /// Reconciles a live remote snapshot into the local store.
    ///
    /// Shares the single-flight guard with [`run_sync`](Self::run_sync) and
    /// leaves the status untouched. Returns `None` if the snapshot was
    /// dropped because the engine was busy or the user is no longer signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub fn apply_remote_snapshot(
        &self,
        user_id: &UserId,
        tasks: Vec<Task>,
    ) -> SyncResult<Option<ReconcileSummary>> {
        let Some(_guard) = FlightGuard::acquire(&self.in_progress) else {
            debug!(user = %user_id, "busy, dropping live snapshot");
            return Ok(None);
        };
        if !self.auth.is_signed_in_as(user_id) {
            return Ok(None);
        }

        let summary = self.reconcile(user_id, tasks)?;
        if summary.applied() > 0 {
            debug!(
                user = %user_id,
                inserted = summary.inserted,
                overwritten = summary.overwritten,
                "applied live snapshot"
            );
        }
        self.stats.write().tasks_pulled += summary.applied() as u64;
        Ok(Some(summary))
    }

    async fn sync_cycle(&self, user_id: &UserId, started: Instant) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();

        for task in self.local.get_pending_deletes(user_id)? {
            match self.remote_call(self.remote.delete(user_id, &task.id)).await {
                Ok(()) => {
                    self.local.purge(&task.id, user_id)?;
                    report.deleted += 1;
                    debug!(user = %user_id, task = %task.id, "pushed delete");
                }
                Err(e) => {
                    report.push_failures += 1;
                    warn!(user = %user_id, task = %task.id, error = %e, "failed to push delete");
                }
            }
        }

        // Acknowledged revisions are marked in one local write. A crash
        // before that only re-pushes them, and upserts are idempotent.
        let mut acked = Vec::new();
        for task in self.local.get_unsynced(user_id)? {
            match self.remote_call(self.remote.upsert(&task)).await {
                Ok(()) => acked.push((task.id, task.updated_at)),
                Err(e) => {
                    report.push_failures += 1;
                    warn!(user = %user_id, task = %task.id, error = %e, "failed to push task");
                }
            }
        }
        let marked = self.local.mark_all_synced_if_unchanged(user_id, &acked)?;
        for ((id, _), synced) in acked.iter().zip(marked) {
            if synced {
                report.pushed += 1;
                debug!(user = %user_id, task = %id, "pushed task");
            } else {
                report.superseded += 1;
                debug!(user = %user_id, task = %id, "task changed during push");
            }
        }

        let remote_tasks = self.remote_call(self.remote.fetch_all(user_id)).await?;
        report.pulled = self.reconcile(user_id, remote_tasks)?;

        report.synced_at = self.clock.now_millis();
        self.local.set_last_synced_at(report.synced_at)?;
        report.duration = started.elapsed();
        Ok(report)
    }

    fn reconcile(&self, user_id: &UserId, mut remote: Vec<Task>) -> SyncResult<ReconcileSummary> {
        remote.retain(|t| {
            let own = &t.user_id == user_id;
            if !own {
                warn!(user = %user_id, task = %t.id, "ignoring remote task of another user");
            }
            own
        });

        let mut local = self.local.get_all(user_id)?;
        local.extend(self.local.get_pending_deletes(user_id)?);

        let plan = reconcile::plan(&local, remote);
        Ok(reconcile::apply(self.local.as_ref(), plan)?)
    }

    async fn remote_call<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.config.remote_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("in_progress", &self.is_syncing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::error::SyncError;
    use crate::status::SyncStatus;
    use tasksync_core::{ManualClock, TaskDraft, TaskPatch};
    use tasksync_remote::{InMemoryRemote, SessionAuth};
    use tasksync_storage::{InMemoryBackend, TaskStore};

    struct Harness {
        engine: Arc<SyncEngine>,
        local: Arc<TaskStore>,
        remote: InMemoryRemote,
        connectivity: Arc<ManualConnectivity>,
        auth: Arc<SessionAuth>,
        user: UserId,
    }

    fn harness() -> Harness {
        let user = UserId::new("alice");
        let local = Arc::new(TaskStore::in_memory());
        let remote = InMemoryRemote::new();
        let connectivity = Arc::new(ManualConnectivity::online());
        let auth = Arc::new(SessionAuth::signed_in(user.clone()));
        let engine = SyncEngine::new(
            SyncConfig::default(),
            local.clone(),
            Arc::new(remote.clone()),
            auth.clone(),
            connectivity.clone(),
        )
        .with_clock(Arc::new(ManualClock::new(1_000_000)));
        Harness {
            engine: Arc::new(engine),
            local,
            remote,
            connectivity,
            auth,
            user,
        }
    }

    #[tokio::test]
    async fn sync_engine_initial_state() {
        let h = harness();
        assert_eq!(h.engine.status().current().status, SyncStatus::Idle);
        assert_eq!(h.engine.stats().cycles_completed, 0);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test]
    async fn run_saves_local_snapshot_once_per_phase() {
        let user = UserId::new("alice");
        let backend = InMemoryBackend::new();
        let local = Arc::new(TaskStore::open(backend.clone()).unwrap());
        let remote = InMemoryRemote::new();
        for i in 0..30 {
            local.create(TaskDraft::new(user.clone(), format!("local {i}"))).unwrap();
        }
        for i in 0..10 {
            let mut task = Task::from_draft(
                TaskDraft::new(user.clone(), format!("remote {i}")),
                tasksync_core::TaskId::new(),
                5,
            );
            task.synced = true;
            remote.put_direct(task);
        }
        let engine = SyncEngine::new(
            SyncConfig::default(),
            local.clone(),
            Arc::new(remote.clone()),
            Arc::new(SessionAuth::signed_in(user.clone())),
            Arc::new(ManualConnectivity::online()),
        );
        let saves = backend.save_count();

        let report = engine.run_sync(&user).await.unwrap().report().cloned().unwrap();

        assert_eq!(report.pushed, 30);
        assert_eq!(report.pulled.inserted, 10);
        // Push marks, pull inserts, last sync time.
        assert_eq!(backend.save_count(), saves + 3);
        assert!(local.get_unsynced(&user).unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_skips_without_status_change() {
        let h = harness();
        h.connectivity.set_online(false);
        h.local.create(TaskDraft::new(h.user.clone(), "a")).unwrap();

        let outcome = h.engine.run_sync(&h.user).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Offline));
        assert_eq!(h.engine.status().current().status, SyncStatus::Idle);
        assert_eq!(h.remote.call_count(), 0);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test]
    async fn signed_out_skips() {
        let h = harness();
        h.auth.sign_out();

        let outcome = h.engine.run_sync(&h.user).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn successful_run_updates_status_and_stats() {
        let h = harness();
        h.local.create(TaskDraft::new(h.user.clone(), "a")).unwrap();

        let outcome = h.engine.run_sync(&h.user).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.synced_at, 1_000_000);

        let status = h.engine.status().current();
        assert_eq!(status.status, SyncStatus::Succeeded);
        assert_eq!(status.last_synced_at, Some(1_000_000));
        assert_eq!(status.pending_changes, 0);
        assert_eq!(h.local.last_synced_at().unwrap(), Some(1_000_000));
        assert_eq!(h.engine.stats().cycles_completed, 1);
        assert_eq!(h.engine.stats().tasks_pushed, 1);
    }

    #[tokio::test]
    async fn per_record_failure_does_not_abort_push() {
        let h = harness();
        let bad = h.local.create(TaskDraft::new(h.user.clone(), "bad")).unwrap();
        let good = h.local.create(TaskDraft::new(h.user.clone(), "good")).unwrap();
        h.remote.fail_writes_for(bad.id.clone());

        let outcome = h.engine.run_sync(&h.user).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.push_failures, 1);

        assert!(h.local.get(&good.id, &h.user).unwrap().unwrap().synced);
        assert!(!h.local.get(&bad.id, &h.user).unwrap().unwrap().synced);
        assert_eq!(h.engine.status().current().status, SyncStatus::Succeeded);
        assert_eq!(h.engine.status().current().pending_changes, 1);
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_run() {
        let h = harness();
        h.remote
            .set_fetch_error(Some(RemoteError::network("connection reset")));

        let err = h.engine.run_sync(&h.user).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Network(_))));

        let status = h.engine.status().current();
        assert_eq!(status.status, SyncStatus::Failed);
        assert!(status.error.unwrap().contains("connection reset"));
        assert_eq!(status.last_synced_at, None);
        assert_eq!(h.engine.stats().cycles_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_remote_times_out() {
        let h = harness();
        h.remote.set_latency(Duration::from_secs(600));

        let err = h.engine.run_sync(&h.user).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Timeout)));
        assert_eq!(h.engine.status().current().status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn edit_during_push_stays_dirty() {
        let h = harness();
        let task = h.local.create(TaskDraft::new(h.user.clone(), "v1")).unwrap();

        // Simulate an edit landing after get_unsynced but before mark-synced.
        let pushed_revision = task.updated_at;
        h.local
            .update(&task.id, &h.user, &TaskPatch::new().title("v2"))
            .unwrap();
        assert!(!h
            .local
            .mark_synced_if_unchanged(&task.id, &h.user, pushed_revision)
            .unwrap());

        h.engine.run_sync(&h.user).await.unwrap();
        let stored = h.local.get(&task.id, &h.user).unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(h.remote.get(&h.user, &task.id).unwrap().title, "v2");
    }

    #[tokio::test]
    async fn live_snapshot_is_reconciled() {
        let h = harness();
        let mut remote_task = Task::from_draft(
            TaskDraft::new(h.user.clone(), "from web"),
            tasksync_core::TaskId::new(),
            5,
        );
        remote_task.synced = true;

        let summary = h
            .engine
            .apply_remote_snapshot(&h.user, vec![remote_task.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert!(h.local.get(&remote_task.id, &h.user).unwrap().is_some());
        assert_eq!(h.engine.status().current().status, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn foreign_remote_tasks_are_ignored() {
        let h = harness();
        let foreign = Task::from_draft(
            TaskDraft::new(UserId::new("mallory"), "not yours"),
            tasksync_core::TaskId::new(),
            5,
        );

        let summary = h
            .engine
            .apply_remote_snapshot(&h.user, vec![foreign])
            .unwrap()
            .unwrap();
        assert_eq!(summary, ReconcileSummary::default());
        assert!(h.local.is_empty());
    }
}
