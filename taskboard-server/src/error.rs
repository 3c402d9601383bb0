//! Error taxonomy for board operations.

use taskboard_proto::board::RejectKind;
use taskboard_proto::presence::UserId;
use taskboard_proto::task::{Task, TaskId, ValidationError};

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors a board request can end in.
///
/// Validation, not-found and auth errors are terminal and go straight back to
/// the requester. A version conflict is recoverable: it is turned into a
/// conflict record instead of a bare failure. A lock denial is answered with
/// the holder so the client can show who is editing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Malformed or out-of-range fields.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Unknown or deleted task.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The expected version is stale; carries the authoritative task.
    #[error("version conflict: task {} is at version {}", .0.id, .0.version)]
    VersionConflict(Box<Task>),
    /// The soft edit lock is held by another user.
    #[error("task {task_id} is being edited by {holder}")]
    LockDenied {
        /// Requested task.
        task_id: TaskId,
        /// Current lock holder.
        holder: UserId,
    },
    /// Missing or invalid credential.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl From<StoreError> for BoardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(current) => Self::VersionConflict(current),
            StoreError::AlreadyExists(id) => Self::Validation(ValidationError::DuplicateTask(id)),
        }
    }
}

impl BoardError {
    /// Wire category for terminal errors; `None` for version conflicts and
    /// lock denials, which have dedicated replies.
    #[must_use]
    pub const fn reject_kind(&self) -> Option<RejectKind> {
        match self {
            Self::Validation(_) => Some(RejectKind::Validation),
            Self::NotFound(_) => Some(RejectKind::NotFound),
            Self::Auth(_) => Some(RejectKind::Auth),
            Self::VersionConflict(_) | Self::LockDenied { .. } => None,
        }
    }
}
