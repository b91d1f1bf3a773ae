//! Directory-backed remote store.

use crate::auth::AuthProvider;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{RemoteStore, SnapshotStream};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksync_core::{ChangeFeed, Task, TaskId, UserId};
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

type Collection = BTreeMap<TaskId, Task>;

/// A remote store kept in a directory, one JSON file per user.
///
/// Several local stores (for example two CLI data directories) can point at
/// the same directory to play the part of several devices sharing one
/// server. Each write holds an exclusive lock on `<user>.lock` across its
/// load, modify and store steps, so writers in different instances or
/// processes never lose each other's updates. Each file is replaced
/// atomically through a temporary file.
///
/// Live snapshots are only delivered for writes made through this instance.
pub struct FileRemote {
    root: PathBuf,
    auth: Option<Arc<dyn AuthProvider>>,
    write_lock: Mutex<()>,
    feeds: RwLock<HashMap<UserId, Arc<ChangeFeed<RemoteResult<Vec<Task>>>>>>,
}

impl FileRemote {
    /// Opens (and creates if needed) a remote directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            auth: None,
            write_lock: Mutex::new(()),
            feeds: RwLock::new(HashMap::new()),
        })
    }

    /// Requires a session from `auth` for every call.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Returns the remote directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, user_id: &UserId) -> RemoteResult<PathBuf> {
        let name = user_id.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RemoteError::Rejected(format!("invalid user id {name:?}")));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    /// Blocks (off the async workers) until this user's collection is ours.
    async fn lock_collection(&self, user_id: &UserId) -> RemoteResult<File> {
        let path = self.collection_path(user_id)?.with_extension("lock");
        let shown = path.display().to_string();
        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(|e| RemoteError::network(format!("{shown}: lock task failed: {e}")))?
        .map_err(|e| RemoteError::network(format!("{shown}: {e}")))
    }

    fn check_session(&self, user_id: &UserId) -> RemoteResult<()> {
        match &self.auth {
            Some(auth) if !auth.is_signed_in_as(user_id) => Err(RemoteError::NotAuthenticated),
            _ => Ok(()),
        }
    }

    async fn load(&self, user_id: &UserId) -> RemoteResult<Collection> {
        let path = self.collection_path(user_id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Collection::new()),
            Err(e) => return Err(RemoteError::network(format!("{}: {e}", path.display()))),
        };

        let tasks: Vec<Task> = serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::network(format!("{}: {e}", path.display())))?;
        Ok(tasks.into_iter().map(|t| (t.id.clone(), t)).collect())
    }

    async fn store(&self, user_id: &UserId, collection: &Collection) -> RemoteResult<()> {
        let path = self.collection_path(user_id)?;
        let tasks: Vec<&Task> = collection.values().collect();
        let data = serde_json::to_vec_pretty(&tasks)
            .map_err(|e| RemoteError::network(e.to_string()))?;

        let temp = path.with_extension("json.tmp");
        let io_err = |e: io::Error| RemoteError::network(format!("{}: {e}", path.display()));
        fs::write(&temp, &data).await.map_err(io_err)?;
        fs::rename(&temp, &path).await.map_err(io_err)?;
        Ok(())
    }

    fn broadcast(&self, user_id: &UserId, collection: &Collection) {
        let feed = self.feeds.read().get(user_id).cloned();
        if let Some(feed) = feed {
            feed.emit(Ok(collection.values().map(Task::as_remote).collect()));
        }
    }
}

#[async_trait]
impl RemoteStore for FileRemote {
    async fn upsert(&self, task: &Task) -> RemoteResult<()> {
        self.check_session(&task.user_id)?;
        if task.id.as_str().is_empty() {
            return Err(RemoteError::Rejected("empty document id".into()));
        }

        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_collection(&task.user_id).await?;
        let mut collection = self.load(&task.user_id).await?;
        collection.insert(task.id.clone(), task.as_remote());
        self.store(&task.user_id, &collection).await?;

        debug!(user = %task.user_id, task = %task.id, "remote upsert");
        self.broadcast(&task.user_id, &collection);
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, id: &TaskId) -> RemoteResult<()> {
        self.check_session(user_id)?;

        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_collection(user_id).await?;
        let mut collection = self.load(user_id).await?;
        if collection.remove(id).is_some() {
            self.store(user_id, &collection).await?;
            debug!(user = %user_id, task = %id, "remote delete");
            self.broadcast(user_id, &collection);
        }
        Ok(())
    }

    async fn fetch_all(&self, user_id: &UserId) -> RemoteResult<Vec<Task>> {
        self.check_session(user_id)?;
        let collection = self.load(user_id).await?;
        Ok(collection.values().map(Task::as_remote).collect())
    }

    fn subscribe(&self, user_id: &UserId) -> SnapshotStream {
        if let Err(e) = self.check_session(user_id) {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(Err(e));
            return rx;
        }

        let feed = self
            .feeds
            .write()
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(ChangeFeed::new()))
            .clone();
        feed.subscribe()
    }
}
