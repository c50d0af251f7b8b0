//! Document storage for users and tasks.
//!
//! [`Database`] is the in-memory collection of both document kinds and
//! implements [`Store`] directly. [`FileStore`] persists a `Database` as a
//! single JSON file, re-reading it before every operation and writing it back
//! atomically (temp file + rename) after every mutation. Mutations hold an
//! exclusive lock on a sidecar `.lock` file from load to rename, so the
//! version check in [`Store::replace_task`] holds across processes.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::fields::Role;
use crate::scope::TaskFilter;
use crate::task::{Task, TaskId};
use crate::user::{normalise_email, User, UserId};

/// Persistence seam used by the tracker.
///
/// Tasks carry a `version`; [`Store::replace_task`] only succeeds when the
/// stored version equals `expected_version`, and stores the task with the
/// version incremented.
pub trait Store {
    fn list_users(&self) -> Result<Vec<User>>;
    fn find_user(&self, id: UserId) -> Result<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn any_user_with_role(&self, role: Role) -> Result<bool>;
    /// Insert a new user. A duplicate email is a validation error.
    fn insert_user(&mut self, user: User) -> Result<()>;
    fn replace_user(&mut self, user: User) -> Result<()>;
    fn delete_user(&mut self, id: UserId) -> Result<bool>;

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    fn find_task(&self, id: TaskId) -> Result<Option<Task>>;
    fn insert_task(&mut self, task: Task) -> Result<()>;
    fn replace_task(&mut self, task: Task, expected_version: u64) -> Result<Task>;
    fn delete_task(&mut self, id: TaskId) -> Result<bool>;
}

/// In-memory database of users and tasks.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

impl Database {
    /// Load database from a JSON file. A missing file is an empty database;
    /// an unreadable or unparsable one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "database file absent, starting empty");
            return Ok(Database::default());
        }
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(Database::default());
        }
        let db: Database = serde_json::from_str(&buf).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse database");
        })?;
        Ok(db)
    }

    /// Save database to JSON file using atomic write (unique temp file in
    /// the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = parent_dir(path);
        fs::create_dir_all(dir)?;
        let data = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), users = self.users.len(), tasks = self.tasks.len(), "database saved");
        Ok(())
    }

    pub fn get_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }
}

impl Store for Database {
    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.get_user(id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalise_email(email);
        Ok(self.users.iter().find(|u| u.email == email).cloned())
    }

    fn any_user_with_role(&self, role: Role) -> Result<bool> {
        Ok(self.users.iter().any(|u| u.role == role))
    }

    fn insert_user(&mut self, mut user: User) -> Result<()> {
        user.email = normalise_email(&user.email);
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(TrackerError::validation(format!("email already exists: {}", user.email)));
        }
        self.users.push(user);
        Ok(())
    }

    fn replace_user(&mut self, user: User) -> Result<()> {
        let slot = self
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| TrackerError::not_found(format!("user {}", user.id)))?;
        *slot = user;
        Ok(())
    }

    fn delete_user(&mut self, id: UserId) -> Result<bool> {
        let before = self.users.len();
        self.users.retain(|u| u.id != id);
        Ok(self.users.len() != before)
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.tasks.iter().filter(|t| filter.matches(t)).cloned().collect())
    }

    fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.get_task(id).cloned())
    }

    fn insert_task(&mut self, task: Task) -> Result<()> {
        if self.get_task(task.id).is_some() {
            return Err(TrackerError::Conflict(format!("task {} already exists", task.id)));
        }
        self.tasks.push(task);
        Ok(())
    }

    fn replace_task(&mut self, mut task: Task, expected_version: u64) -> Result<Task> {
        let slot = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| TrackerError::not_found(format!("task {}", task.id)))?;
        if slot.version != expected_version {
            return Err(TrackerError::Conflict(format!(
                "task {} changed concurrently (expected version {}, found {})",
                task.id, expected_version, slot.version
            )));
        }
        task.version = expected_version + 1;
        *slot = task.clone();
        Ok(task)
    }

    fn delete_task(&mut self, id: TaskId) -> Result<bool> {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        Ok(self.tasks.len() != before)
    }
}

/// A [`Database`] persisted as one JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = Database::load(&self.path)?;
        f(&db)
    }

    /// Take the exclusive write lock. Released when the returned file drops.
    fn lock(&self) -> Result<File> {
        fs::create_dir_all(parent_dir(&self.path))?;
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("json.lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Load, mutate, and save only if the mutation succeeded, all under the
    /// write lock.
    fn write<T>(&mut self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let _lock = self.lock()?;
        let mut db = Database::load(&self.path)?;
        let out = f(&mut db)?;
        db.save(&self.path)?;
        Ok(out)
    }
}

impl Store for FileStore {
    fn list_users(&self) -> Result<Vec<User>> {
        self.read(|db| db.list_users())
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        self.read(|db| db.find_user(id))
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.read(|db| db.find_user_by_email(email))
    }

    fn any_user_with_role(&self, role: Role) -> Result<bool> {
        self.read(|db| db.any_user_with_role(role))
    }

    fn insert_user(&mut self, user: User) -> Result<()> {
        self.write(|db| db.insert_user(user))
    }

    fn replace_user(&mut self, user: User) -> Result<()> {
        self.write(|db| db.replace_user(user))
    }

    fn delete_user(&mut self, id: UserId) -> Result<bool> {
        self.write(|db| db.delete_user(id))
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.read(|db| db.find_tasks(filter))
    }

    fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.read(|db| db.find_task(id))
    }

    fn insert_task(&mut self, task: Task) -> Result<()> {
        self.write(|db| db.insert_task(task))
    }

    fn replace_task(&mut self, task: Task, expected_version: u64) -> Result<Task> {
        self.write(|db| db.replace_task(task, expected_version))
    }

    fn delete_task(&mut self, id: TaskId) -> Result<bool> {
        self.write(|db| db.delete_task(id))
    }
}
