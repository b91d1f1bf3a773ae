//! In-memory remote store for testing and single-process demos.

use crate::auth::AuthProvider;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{RemoteStore, SnapshotStream};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasksync_core::{ChangeFeed, Task, TaskId, UserId};
use tokio::sync::mpsc;
use tracing::debug;

type SnapshotFeed = ChangeFeed<RemoteResult<Vec<Task>>>;

#[derive(Default)]
struct RemoteState {
    collections: HashMap<UserId, BTreeMap<TaskId, Task>>,
    offline: bool,
    latency: Duration,
    failing_writes: HashSet<TaskId>,
    fetch_error: Option<RemoteError>,
}

#[derive(Default)]
struct Counters {
    upserts: AtomicU64,
    deletes: AtomicU64,
    fetches: AtomicU64,
}

struct Inner {
    state: RwLock<RemoteState>,
    feeds: RwLock<HashMap<UserId, Arc<SnapshotFeed>>>,
    counters: Counters,
    auth: Option<Arc<dyn AuthProvider>>,
}

/// An in-memory remote task store.
///
/// Collections are kept per user. Clones share the same backend, so one
/// clone can be handed to a sync engine while the test keeps another to
/// inspect documents, inject faults or write "from another device".
///
/// Without an [`AuthProvider`] every user is treated as signed in.
///
/// # Fault injection
///
/// - [`set_offline`](Self::set_offline) fails every call with `Network`
/// - [`fail_writes_for`](Self::fail_writes_for) fails upserts of one task
/// - [`set_fetch_error`](Self::set_fetch_error) fails `fetch_all`
/// - [`set_latency`](Self::set_latency) delays every call
#[derive(Clone)]
pub struct InMemoryRemote {
    inner: Arc<Inner>,
}

impl InMemoryRemote {
    /// Creates an empty remote that accepts every user.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty remote that requires a session from `auth`.
    pub fn with_auth(auth: Arc<dyn AuthProvider>) -> Self {
        Self::build(Some(auth))
    }

    fn build(auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(RemoteState::default()),
                feeds: RwLock::new(HashMap::new()),
                counters: Counters::default(),
                auth,
            }),
        }
    }

    /// Makes every following call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.state.write().offline = offline;
    }

    /// Delays every following call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.state.write().latency = latency;
    }

    /// Makes upserts of `id` fail with a write error.
    pub fn fail_writes_for(&self, id: TaskId) {
        self.inner.state.write().failing_writes.insert(id);
    }

    /// Makes `fetch_all` fail with `error`, or succeed again with `None`.
    pub fn set_fetch_error(&self, error: Option<RemoteError>) {
        self.inner.state.write().fetch_error = error;
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        let mut state = self.inner.state.write();
        state.offline = false;
        state.latency = Duration::ZERO;
        state.failing_writes.clear();
        state.fetch_error = None;
    }

    /// Writes a document as another device would, bypassing faults and
    /// authentication. Subscribers receive the new snapshot.
    pub fn put_direct(&self, task: Task) {
        let user_id = task.user_id.clone();
        self.inner
            .state
            .write()
            .collections
            .entry(user_id.clone())
            .or_default()
            .insert(task.id.clone(), task.as_remote());
        self.broadcast(&user_id);
    }

    /// Deletes a document as another device would.
    pub fn delete_direct(&self, user_id: &UserId, id: &TaskId) {
        if let Some(collection) = self.inner.state.write().collections.get_mut(user_id) {
            collection.remove(id);
        }
        self.broadcast(user_id);
    }

    /// Delivers `error` to every live subscriber of `user_id`.
    pub fn broadcast_error(&self, user_id: &UserId, error: RemoteError) {
        if let Some(feed) = self.feed(user_id) {
            feed.emit(Err(error));
        }
    }

    /// Returns the user's documents ordered by id.
    pub fn tasks(&self, user_id: &UserId) -> Vec<Task> {
        self.inner
            .state
            .read()
            .collections
            .get(user_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns one document.
    pub fn get(&self, user_id: &UserId, id: &TaskId) -> Option<Task> {
        self.inner
            .state
            .read()
            .collections
            .get(user_id)
            .and_then(|c| c.get(id).cloned())
    }

    /// Number of `upsert` calls received, failed ones included.
    pub fn upsert_count(&self) -> u64 {
        self.inner.counters.upserts.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls received, failed ones included.
    pub fn delete_count(&self) -> u64 {
        self.inner.counters.deletes.load(Ordering::SeqCst)
    }

    /// Number of `fetch_all` calls received, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.inner.counters.fetches.load(Ordering::SeqCst)
    }

    /// Total number of remote calls received.
    pub fn call_count(&self) -> u64 {
        self.upsert_count() + self.delete_count() + self.fetch_count()
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.state.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_call(&self, user_id: &UserId) -> RemoteResult<()> {
        if self.inner.state.read().offline {
            return Err(RemoteError::network("remote unreachable"));
        }
        match &self.inner.auth {
            Some(auth) if !auth.is_signed_in_as(user_id) => Err(RemoteError::NotAuthenticated),
            _ => Ok(()),
        }
    }

    fn feed(&self, user_id: &UserId) -> Option<Arc<SnapshotFeed>> {
        self.inner.feeds.read().get(user_id).cloned()
    }

    fn broadcast(&self, user_id: &UserId) {
        if let Some(feed) = self.feed(user_id) {
            feed.emit(Ok(self.tasks(user_id)));
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn upsert(&self, task: &Task) -> RemoteResult<()> {
        self.inner.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_call(&task.user_id)?;

        if task.id.as_str().is_empty() {
            return Err(RemoteError::Rejected("empty document id".into()));
        }

        {
            let mut state = self.inner.state.write();
            if state.failing_writes.contains(&task.id) {
                return Err(RemoteError::write(task.id.clone(), "injected write failure"));
            }
            state
                .collections
                .entry(task.user_id.clone())
                .or_default()
                .insert(task.id.clone(), task.as_remote());
        }

        debug!(user = %task.user_id, task = %task.id, "remote upsert");
        self.broadcast(&task.user_id);
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, id: &TaskId) -> RemoteResult<()> {
        self.inner.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_call(user_id)?;

        let removed = self
            .inner
            .state
            .write()
            .collections
            .get_mut(user_id)
            .and_then(|c| c.remove(id))
            .is_some();

        debug!(user = %user_id, task = %id, removed, "remote delete");
        if removed {
            self.broadcast(user_id);
        }
        Ok(())
    }

    async fn fetch_all(&self, user_id: &UserId) -> RemoteResult<Vec<Task>> {
        self.inner.counters.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_call(user_id)?;

        if let Some(error) = self.inner.state.read().fetch_error.clone() {
            return Err(error);
        }
        Ok(self.tasks(user_id))
    }

    fn subscribe(&self, user_id: &UserId) -> SnapshotStream {
        if let Some(auth) = &self.inner.auth {
            if !auth.is_signed_in_as(user_id) {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(Err(RemoteError::NotAuthenticated));
                return rx;
            }
        }

        let feed = self
            .inner
            .feeds
            .write()
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(ChangeFeed::new()))
            .clone();
        feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionAuth;
    use tasksync_core::TaskDraft;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn task(id: &str, title: &str, updated_at: i64) -> Task {
        let mut task = Task::from_draft(TaskDraft::new(alice(), title), TaskId::from(id), 1);
        task.updated_at = updated_at;
        task
    }

    #[tokio::test]
    async fn upsert_then_fetch() {
        let remote = InMemoryRemote::new();
        remote.upsert(&task("t1", "one", 5)).await.unwrap();
        remote.upsert(&task("t1", "one again", 6)).await.unwrap();

        let fetched = remote.fetch_all(&alice()).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].title, "one again");
        assert!(fetched[0].synced);
        assert!(!fetched[0].is_deleted);
    }

    #[tokio::test]
    async fn collections_are_per_user() {
        let remote = InMemoryRemote::new();
        remote.upsert(&task("t1", "mine", 1)).await.unwrap();
        assert!(remote.fetch_all(&UserId::new("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let remote = InMemoryRemote::new();
        remote.upsert(&task("t1", "a", 1)).await.unwrap();

        remote.delete(&alice(), &TaskId::from("t1")).await.unwrap();
        remote.delete(&alice(), &TaskId::from("t1")).await.unwrap();
        assert!(remote.tasks(&alice()).is_empty());
        assert_eq!(remote.delete_count(), 2);
    }

    #[tokio::test]
    async fn requires_session_when_auth_is_set() {
        let auth = Arc::new(SessionAuth::new());
        let remote = InMemoryRemote::with_auth(auth.clone());

        let err = remote.upsert(&task("t1", "a", 1)).await.unwrap_err();
        assert_eq!(err, RemoteError::NotAuthenticated);

        auth.sign_in(alice());
        remote.upsert(&task("t1", "a", 1)).await.unwrap();
        assert_eq!(
            remote.fetch_all(&UserId::new("bob")).await.unwrap_err(),
            RemoteError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn injected_faults() {
        let remote = InMemoryRemote::new();
        remote.set_offline(true);
        assert!(matches!(
            remote.fetch_all(&alice()).await,
            Err(RemoteError::Network(_))
        ));

        remote.set_offline(false);
        remote.fail_writes_for(TaskId::from("bad"));
        assert!(matches!(
            remote.upsert(&task("bad", "x", 1)).await,
            Err(RemoteError::Write { .. })
        ));
        remote.upsert(&task("good", "y", 1)).await.unwrap();

        remote.set_fetch_error(Some(RemoteError::Timeout));
        assert_eq!(remote.fetch_all(&alice()).await, Err(RemoteError::Timeout));

        remote.clear_faults();
        assert_eq!(remote.fetch_all(&alice()).await.unwrap().len(), 1);
        assert_eq!(remote.fetch_count(), 3);
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let remote = InMemoryRemote::new();
        let result = remote.upsert(&task("", "x", 1)).await;
        assert!(matches!(result, Err(RemoteError::Rejected(_))));
    }

    #[tokio::test]
    async fn subscribers_receive_snapshots() {
        let remote = InMemoryRemote::new();
        let mut stream = remote.subscribe(&alice());

        remote.put_direct(task("t1", "from tablet", 10));
        let snapshot = stream.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "from tablet");

        remote.broadcast_error(&alice(), RemoteError::network("stream reset"));
        assert!(stream.recv().await.unwrap().is_err());

        remote.delete_direct(&alice(), &TaskId::from("t1"));
        assert!(stream.recv().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_without_session_reports_in_band() {
        let remote = InMemoryRemote::with_auth(Arc::new(SessionAuth::new()));
        let mut stream = remote.subscribe(&alice());

        assert_eq!(stream.recv().await, Some(Err(RemoteError::NotAuthenticated)));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_calls() {
        let remote = InMemoryRemote::new();
        remote.set_latency(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        remote.fetch_all(&alice()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
