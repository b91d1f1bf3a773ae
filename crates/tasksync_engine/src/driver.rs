//! Background driver that turns external events into sync runs.

use crate::connectivity::NetworkState;
use crate::engine::{SkipReason, SyncEngine, SyncOutcome};
use std::sync::Arc;
use tasksync_core::{Task, UserId};
use tasksync_remote::{RemoteResult, SnapshotStream};
use tasksync_storage::ChangeReceiver;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    CameOnline,
    LocalChange,
    Interval,
    SignedIn,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::CameOnline => "came online",
            Trigger::LocalChange => "local change",
            Trigger::Interval => "interval",
            Trigger::SignedIn => "signed in",
        }
    }
}

/// Starts automatic synchronization for an engine.
///
/// The driver listens to:
/// - connectivity: an offline to online transition triggers a run
/// - the local store: user edits trigger a run while online
/// - a timer: a run every [`auto_sync_interval`](crate::SyncConfig::auto_sync_interval)
/// - authentication: sign-in opens the user's live remote stream and triggers
///   an initial run; sign-out closes the stream
/// - the live remote stream: each snapshot is reconciled into the local store
///
/// Every trigger spawns its own run, so triggers arriving during a run are
/// dropped by the engine's single-flight guard.
pub struct AutoSync;

impl AutoSync {
    /// Spawns the driver on the current tokio runtime.
    pub fn start(engine: Arc<SyncEngine>) -> AutoSyncHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = Driver::new(engine);
        let task = tokio::spawn(driver.run(shutdown_rx));
        AutoSyncHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`AutoSync`] driver. Dropping it aborts the driver.
#[derive(Debug)]
pub struct AutoSyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AutoSyncHandle {
    /// Stops the driver and waits for it to exit.
    ///
    /// Runs already spawned by the driver are not cancelled.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                warn!(error = %e, "auto-sync driver panicked");
            }
        }
    }

    /// Returns true once the driver has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    engine: Arc<SyncEngine>,
    user: Option<UserId>,
    network: watch::Receiver<NetworkState>,
    session: watch::Receiver<Option<UserId>>,
    changes: ChangeReceiver,
    live: Option<SnapshotStream>,
    ticker: Option<Interval>,
}

impl Driver {
    fn new(engine: Arc<SyncEngine>) -> Self {
        let network = engine.connectivity().subscribe();
        let session = engine.auth().watch();
        let changes = engine.local().subscribe();
        let ticker = engine.config().auto_sync_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        Self {
            engine,
            user: None,
            network,
            session,
            changes,
            live: None,
            ticker,
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("auto-sync started");
        let mut was_online = self.network.borrow_and_update().is_online();
        let initial_user = self.session.borrow_and_update().clone();
        self.switch_user(initial_user);

        let mut network_open = true;
        let mut session_open = true;
        let mut changes_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                changed = self.network.changed(), if network_open => {
                    if changed.is_err() {
                        network_open = false;
                        continue;
                    }
                    let online = self.network.borrow_and_update().is_online();
                    if online && !was_online {
                        self.trigger(Trigger::CameOnline);
                    }
                    was_online = online;
                }

                changed = self.session.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                        continue;
                    }
                    let user = self.session.borrow_and_update().clone();
                    if user != self.user {
                        self.switch_user(user);
                    }
                }

                change = self.changes.recv(), if changes_open => {
                    let Some(change) = change else {
                        changes_open = false;
                        continue;
                    };
                    if self.user.as_ref() != Some(&change.user_id) {
                        continue;
                    }
                    self.refresh_pending();
                    if change.is_user_change() && self.engine.config().sync_on_local_change {
                        self.trigger(Trigger::LocalChange);
                    }
                }

                snapshot = next_snapshot(&mut self.live) => match snapshot {
                    Some(Ok(tasks)) => self.apply_snapshot(tasks),
                    Some(Err(e)) => warn!(error = %e, "live remote stream error"),
                    None => {
                        debug!("live remote stream closed");
                        self.live = None;
                    }
                },

                _ = next_tick(&mut self.ticker) => self.trigger(Trigger::Interval),
            }
        }
        info!("auto-sync stopped");
    }

    fn switch_user(&mut self, user: Option<UserId>) {
        self.live = None;
        self.user = user;

        let Some(user) = self.user.clone() else {
            return;
        };
        if self.engine.config().live_updates {
            self.live = Some(self.engine.remote().subscribe(&user));
        }
        self.refresh_pending();
        self.trigger(Trigger::SignedIn);
    }

    fn refresh_pending(&self) {
        if let Some(user) = &self.user {
            if let Err(e) = self.engine.refresh_pending(user) {
                warn!(user = %user, error = %e, "could not count pending changes");
            }
        }
    }

    fn trigger(&self, trigger: Trigger) {
        let Some(user) = self.user.clone() else {
            return;
        };
        if !self.engine.connectivity().is_online() {
            return;
        }

        debug!(user = %user, trigger = trigger.as_str(), "triggering sync");
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            match engine.run_sync(&user).await {
                Ok(SyncOutcome::Skipped(SkipReason::InProgress)) => {
                    debug!(user = %user, trigger = trigger.as_str(), "sync already running");
                }
                Ok(_) => {}
                Err(e) => warn!(user = %user, trigger = trigger.as_str(), error = %e, "triggered sync failed"),
            }
        });
    }

    fn apply_snapshot(&self, tasks: Vec<Task>) {
        let Some(user) = &self.user else {
            return;
        };
        match self.engine.apply_remote_snapshot(user, tasks) {
            Ok(Some(_)) => self.refresh_pending(),
            Ok(None) => {}
            Err(e) => warn!(user = %user, error = %e, "failed to apply live snapshot"),
        }
    }
}

async fn next_snapshot(live: &mut Option<SnapshotStream>) -> Option<RemoteResult<Vec<Task>>> {
    match live {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
