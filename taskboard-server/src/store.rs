//! Persistent store collaborator and its in-memory implementation.
//!
//! The [`TaskStore`] is the single source of truth for task state and
//! versions. Every operation is atomic: a compare-and-swap checks the expected
//! version and applies the patch while holding the task's own lock, so two
//! writers racing on one task can never both observe the same version.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use taskboard_proto::task::{Task, TaskId, TaskPatch, now_millis};

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No live task has this id.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The expected version did not match; carries the current task.
    #[error("version conflict on task {} (current version {})", .0.id, .0.version)]
    Conflict(Box<Task>),
    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
}

/// Result of an accepted compare-and-swap update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated {
    /// Task as it was before the update.
    pub before: Task,
    /// Task after the update, with its version bumped by one.
    pub after: Task,
}

/// Durable task storage.
pub trait TaskStore: Send + Sync {
    /// Returns the current state of a task.
    fn get(&self, id: &TaskId) -> Option<Task>;

    /// Returns every task, newest first.
    fn list(&self) -> Vec<Task>;

    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the id is taken.
    fn create(&self, task: Task) -> Result<Task, StoreError>;

    /// Applies `patch` iff the stored version equals `expected_version`,
    /// bumping the version by exactly one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] with the current task on a version
    /// mismatch, or [`StoreError::NotFound`].
    fn compare_and_swap_update(
        &self,
        id: &TaskId,
        expected_version: u64,
        patch: &TaskPatch,
    ) -> Result<Updated, StoreError>;

    /// Removes a task iff the stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] with the current task on a version
    /// mismatch, or [`StoreError::NotFound`].
    fn delete(&self, id: &TaskId, expected_version: u64) -> Result<Task, StoreError>;
}

/// A slot is emptied when its task is deleted, so a writer that fetched the
/// slot just before the delete still sees "not found" once it gets the lock.
type Slot = Arc<Mutex<Option<Task>>>;

/// In-memory [`TaskStore`] with one mutex per task.
///
/// The outer map lock is only held long enough to find (or insert/remove) a
/// slot; version checks run under the slot's own mutex, so writers on
/// different tasks never contend.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Slot>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &TaskId) -> Option<Slot> {
        self.tasks.read().get(id).cloned()
    }

    /// Number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns `true` if the store holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get(&self, id: &TaskId) -> Option<Task> {
        self.slot(id)?.lock().clone()
    }

    fn list(&self) -> Vec<Task> {
        let slots: Vec<Slot> = self.tasks.read().values().cloned().collect();
        let mut tasks: Vec<Task> = slots.iter().filter_map(|s| s.lock().clone()).collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        tasks
    }

    fn create(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        tasks.insert(task.id, Arc::new(Mutex::new(Some(task.clone()))));
        drop(tasks);
        Ok(task)
    }

    fn compare_and_swap_update(
        &self,
        id: &TaskId,
        expected_version: u64,
        patch: &TaskPatch,
    ) -> Result<Updated, StoreError> {
        let slot = self.slot(id).ok_or(StoreError::NotFound(*id))?;
        let mut guard = slot.lock();
        let current = guard.as_mut().ok_or(StoreError::NotFound(*id))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict(Box::new(current.clone())));
        }

        let before = current.clone();
        patch.apply(current);
        current.version += 1;
        current.updated_at = now_millis().max(before.updated_at);
        let after = current.clone();
        drop(guard);

        Ok(Updated { before, after })
    }

    fn delete(&self, id: &TaskId, expected_version: u64) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write();
        let slot = tasks.get(id).cloned().ok_or(StoreError::NotFound(*id))?;
        let mut guard = slot.lock();

        match guard.as_ref() {
            None => return Err(StoreError::NotFound(*id)),
            Some(current) if current.version != expected_version => {
                return Err(StoreError::Conflict(Box::new(current.clone())));
            }
            Some(_) => {}
        }

        let removed = guard.take().ok_or(StoreError::NotFound(*id))?;
        drop(guard);
        tasks.remove(id);
        drop(tasks);
        Ok(removed)
    }
}
