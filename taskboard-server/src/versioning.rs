//! Version controller: the optimistic concurrency gate every mutation passes.
//!
//! Per task the version walks `Current(0) -> Current(1) -> ...` and ends in
//! `Deleted`. A write naming `expected_version == v` moves the task to `v + 1`;
//! any other expected version is refused with the authoritative snapshot.
//! The compare-and-swap itself is delegated to the [`TaskStore`], which
//! performs it atomically per task.

use std::sync::Arc;

use taskboard_proto::activity::{ActionVerb, ActivityFilter, AuditEntry};
use taskboard_proto::presence::UserId;
use taskboard_proto::task::{NewTask, Task, TaskField, TaskId, TaskPatch, now_millis};

use crate::audit::{self, AuditSink};
use crate::error::BoardError;
use crate::store::TaskStore;

/// Picks the audit verb that best describes a patch.
#[must_use]
pub fn verb_for_patch(patch: &TaskPatch) -> ActionVerb {
    match patch.fields() {
        [TaskField::Status(_)] => ActionVerb::Move,
        [TaskField::AssignedUser(_)] => ActionVerb::Assign,
        _ => ActionVerb::Update,
    }
}

/// Validates, versions and audits every task mutation.
pub struct VersionController {
    store: Arc<dyn TaskStore>,
    audit: Arc<dyn AuditSink>,
}

impl VersionController {
    /// Creates a controller over the given store and audit sink.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Returns the authoritative state of a task.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for unknown or deleted ids.
    pub fn get(&self, task_id: &TaskId) -> Result<Task, BoardError> {
        self.store.get(task_id).ok_or(BoardError::NotFound(*task_id))
    }

    /// Returns every task, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        self.store.list()
    }

    /// Returns up to `limit` audit entries passing `filter`, newest first.
    #[must_use]
    pub fn recent_activity(&self, limit: usize, filter: &ActivityFilter) -> Vec<AuditEntry> {
        self.audit.recent(limit, filter)
    }

    /// Creates a task at version 0. Creation carries no expected version and
    /// always succeeds once validated.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] if the field set is invalid.
    pub fn create(&self, actor: &UserId, request: NewTask) -> Result<Task, BoardError> {
        request.validate()?;
        let now = now_millis();
        let task = self
            .store
            .create(request.into_task(TaskId::new(), actor.clone(), now))?;

        tracing::debug!(task_id = %task.id, actor = %actor, "task created");
        self.record(actor, ActionVerb::Create, task.id, None, Some(task.clone()));
        Ok(task)
    }

    /// Applies `patch` iff the task is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for an invalid patch (checked before
    /// the version), [`BoardError::NotFound`] for unknown or deleted tasks, or
    /// [`BoardError::VersionConflict`] with the authoritative task.
    pub fn update(
        &self,
        actor: &UserId,
        task_id: &TaskId,
        expected_version: u64,
        patch: &TaskPatch,
        verb: ActionVerb,
    ) -> Result<Task, BoardError> {
        patch.validate()?;
        let updated = self
            .store
            .compare_and_swap_update(task_id, expected_version, patch)
            .inspect_err(|e| {
                tracing::debug!(task_id = %task_id, expected_version, error = %e, "update refused");
            })?;

        tracing::debug!(
            task_id = %task_id,
            actor = %actor,
            verb = %verb,
            version = updated.after.version,
            "task updated"
        );
        self.record(
            actor,
            verb,
            *task_id,
            Some(updated.before),
            Some(updated.after.clone()),
        );
        Ok(updated.after)
    }

    /// Deletes the task iff it is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] or [`BoardError::VersionConflict`].
    pub fn delete(
        &self,
        actor: &UserId,
        task_id: &TaskId,
        expected_version: u64,
    ) -> Result<Task, BoardError> {
        let removed = self.store.delete(task_id, expected_version)?;

        tracing::debug!(task_id = %task_id, actor = %actor, "task deleted");
        self.record(actor, ActionVerb::Delete, *task_id, Some(removed.clone()), None);
        Ok(removed)
    }

    fn record(
        &self,
        actor: &UserId,
        verb: ActionVerb,
        task_id: TaskId,
        before: Option<Task>,
        after: Option<Task>,
    ) {
        audit::record_best_effort(
            self.audit.as_ref(),
            AuditEntry {
                actor: actor.clone(),
                verb,
                task_id,
                before,
                after,
                timestamp: now_millis(),
            },
        );
    }
}
