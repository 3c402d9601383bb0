//! Soft edit locks.
//!
//! An edit lock is an advisory hint that one user has a task's edit form
//! open. It is never consulted by the version check: a client can always
//! submit a mutation directly and the store arbitrates. Locks are
//! process-local and start out empty on every restart.
//!
//! Granting a lock and deleting its task both run under the manager's mutex,
//! so a lock can never outlive the task it was granted on.

use std::collections::HashMap;

use parking_lot::Mutex;
use taskboard_proto::presence::UserId;
use taskboard_proto::task::{Task, TaskId};

use crate::error::BoardError;

/// A granted lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The task was unlocked and now belongs to the requester.
    Acquired,
    /// The requester already held the lock (idempotent re-entry).
    AlreadyHeld,
}

/// Task id -> holder map. Attempts never wait: a held lock is denied, not queued.
#[derive(Debug, Default)]
pub struct EditLockManager {
    locks: Mutex<HashMap<TaskId, UserId>>,
}

impl EditLockManager {
    /// Creates a manager with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take the lock on `task_id` for `user`.
    ///
    /// `exists` is asked whether the task is live while the manager's mutex
    /// is held; a delete going through [`Self::remove_task_with`] cannot slip
    /// in between the check and the grant.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if `exists` says no, or
    /// [`BoardError::LockDenied`] if another user holds the lock.
    pub fn try_acquire(
        &self,
        task_id: TaskId,
        user: &UserId,
        exists: impl FnOnce() -> bool,
    ) -> Result<LockOutcome, BoardError> {
        let mut locks = self.locks.lock();
        match locks.get(&task_id) {
            Some(holder) if holder == user => Ok(LockOutcome::AlreadyHeld),
            Some(holder) => Err(BoardError::LockDenied {
                task_id,
                holder: holder.clone(),
            }),
            None if !exists() => Err(BoardError::NotFound(task_id)),
            None => {
                locks.insert(task_id, user.clone());
                Ok(LockOutcome::Acquired)
            }
        }
    }

    /// Releases the lock iff `user` holds it. Returns whether it was released.
    pub fn release(&self, task_id: TaskId, user: &UserId) -> bool {
        let mut locks = self.locks.lock();
        if locks.get(&task_id) == Some(user) {
            locks.remove(&task_id);
            true
        } else {
            false
        }
    }

    /// Runs `remove` (the task's deletion) under the manager's mutex and, if
    /// it succeeds, drops whatever lock the task had.
    ///
    /// Returns `remove`'s value together with the former lock holder.
    ///
    /// # Errors
    ///
    /// Propagates the error from `remove`; the lock is then left untouched.
    pub fn remove_task_with<T, E>(
        &self,
        task_id: TaskId,
        remove: impl FnOnce() -> Result<T, E>,
    ) -> Result<(T, Option<UserId>), E> {
        let mut locks = self.locks.lock();
        let removed = remove()?;
        let holder = locks.remove(&task_id);
        drop(locks);
        Ok((removed, holder))
    }

    /// Releases every lock held by `user`, returning the freed task ids sorted.
    pub fn release_all(&self, user: &UserId) -> Vec<TaskId> {
        let mut locks = self.locks.lock();
        let mut released: Vec<TaskId> = locks
            .iter()
            .filter(|(_, holder)| *holder == user)
            .map(|(task_id, _)| *task_id)
            .collect();
        for task_id in &released {
            locks.remove(task_id);
        }
        drop(locks);
        released.sort();
        released
    }

    /// Current holder of the lock on `task_id`.
    #[must_use]
    pub fn holder(&self, task_id: TaskId) -> Option<UserId> {
        self.locks.lock().get(&task_id).cloned()
    }

    /// Copies the lock state of `task` into its mirror fields.
    pub fn annotate(&self, task: &mut Task) {
        task.set_edit_lock(self.holder(task.id));
    }

    /// Annotates every task in `tasks`.
    pub fn annotate_all(&self, tasks: &mut [Task]) {
        let locks = self.locks.lock();
        for task in tasks {
            task.set_edit_lock(locks.get(&task.id).cloned());
        }
    }
}
