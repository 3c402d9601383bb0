//! Audit trail entries emitted by every accepted mutation.

use serde::{Deserialize, Serialize};

use crate::presence::UserId;
use crate::task::{Task, TaskId};

/// What kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionVerb {
    /// Task created.
    Create,
    /// General field update.
    Update,
    /// Status-only change (a drag between columns).
    Move,
    /// Manual (re)assignment.
    Assign,
    /// Least-loaded automatic assignment.
    SmartAssign,
    /// Task deleted.
    Delete,
}

impl std::fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Move => "move",
            Self::Assign => "assign",
            Self::SmartAssign => "smart_assign",
            Self::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// Append-only record of one accepted mutation.
///
/// `before` is `None` for creations and `after` is `None` for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// User who performed the mutation.
    pub actor: UserId,
    /// Kind of mutation.
    pub verb: ActionVerb,
    /// Affected task.
    pub task_id: TaskId,
    /// Snapshot before the mutation.
    pub before: Option<Task>,
    /// Snapshot after the mutation.
    pub after: Option<Task>,
    /// When the mutation was accepted (milliseconds since epoch).
    pub timestamp: u64,
}

/// Narrows an activity query. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    /// Only entries about this task.
    pub task_id: Option<TaskId>,
    /// Only entries by this actor.
    pub user_id: Option<UserId>,
}

impl ActivityFilter {
    /// Whether `entry` passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.task_id.is_none_or(|id| id == entry.task_id)
            && self.user_id.as_ref().is_none_or(|id| *id == entry.actor)
    }
}
