//! File-based snapshot backend for persistent storage.

use crate::backend::{Snapshot, SnapshotBackend, SNAPSHOT_VERSION};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A file-based snapshot backend.
///
/// The snapshot is stored as a single JSON document. Data survives
/// process restarts.
///
/// # Durability
///
/// `save()` writes the new snapshot to a sibling temporary file, calls
/// `File::sync_all()` and then renames it over the previous file, so a
/// crash mid-save leaves the old snapshot intact.
///
/// # Locking
///
/// The backend holds an exclusive lock on a sibling `<name>.lock` file for
/// as long as it lives. A second backend on the same path, in this process
/// or another, fails to open with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use tasksync_storage::{FileBackend, TaskStore};
/// use std::path::Path;
///
/// let backend = FileBackend::open_with_create_dirs(Path::new("data/alice.json")).unwrap();
/// let store = TaskStore::open(backend).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    _lock_file: File,
}

impl FileBackend {
    /// Opens a file backend at the given path.
    ///
    /// The file does not need to exist; it is created on the first save.
    /// Its parent directory must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is a directory, or
    /// [`StorageError::Locked`] if another backend holds the file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, ".lock"))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Opens a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl SnapshotBackend for FileBackend {
    fn load(&self) -> StorageResult<Option<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::Corrupted(format!("{}: {}", self.path.display(), e))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "{}: unsupported snapshot version {} (expected {})",
                self.path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            )));
        }

        Ok(Some(snapshot))
    }

    fn save(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let temp = sibling(&self.path, ".tmp");

        {
            let mut file = File::create(&temp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::{Task, TaskDraft, TaskId, UserId};
    use tempfile::tempdir;

    fn sample_task() -> Task {
        Task::from_draft(
            TaskDraft::new(UserId::new("u1"), "Write report").with_due_date(10),
            TaskId::from("t1"),
            5,
        )
    }

    #[test]
    fn file_missing_loads_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("tasks.json")).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn file_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let mut backend = FileBackend::open(&path).unwrap();
        let snapshot = Snapshot::new(vec![sample_task()], Some(99));
        backend.save(&snapshot).unwrap();
        assert!(path.exists());
        drop(backend);

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn file_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.save(&Snapshot::default()).unwrap();
        backend.save(&Snapshot::default()).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["tasks.json", "tasks.json.lock"]);
    }

    #[test]
    fn second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let first = FileBackend::open(&path).unwrap();
        let err = FileBackend::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Locked(ref p) if p == &path));

        drop(first);
        assert!(FileBackend::open(&path).is_ok());
    }

    #[test]
    fn file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("tasks.json");

        let mut backend = FileBackend::open_with_create_dirs(&path).unwrap();
        backend.save(&Snapshot::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_garbage_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, b"not json").unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert!(matches!(backend.load(), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_unknown_version_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, br#"{"version": 7, "tasks": []}"#).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        let err = backend.load().unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version 7"));
    }

    #[test]
    fn file_open_directory_fails() {
        let dir = tempdir().unwrap();
        assert!(FileBackend::open(dir.path()).is_err());
    }
}
