//! Conflict records and the resolution strategies a losing client may pick.

use serde::{Deserialize, Serialize};

use crate::activity::ActionVerb;
use crate::task::{Task, TaskFieldKind, TaskId, TaskPatch};

/// Why a mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// The submitted `expected_version` is behind the stored version.
    StaleVersion,
    /// The version is stale and another user currently holds the edit lock.
    LockedByOther,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleVersion => write!(f, "stale_version"),
            Self::LockedByOther => write!(f, "locked_by_other"),
        }
    }
}

/// A refused write paired with the authoritative state it lost against.
///
/// Transient: it lives for one resolution round-trip and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Task the write targeted.
    pub task_id: TaskId,
    /// The client's submitted field set.
    pub submitted: TaskPatch,
    /// Current authoritative task.
    pub authoritative: Task,
    /// Why the write was refused.
    pub reason: ConflictReason,
    /// What the refused write was; a resubmission is audited under it.
    pub verb: ActionVerb,
}

/// Which side wins a single field during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeSide {
    /// Keep the value the client submitted.
    Mine,
    /// Keep the authoritative value.
    Theirs,
}

/// Per-field merge choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChoice {
    /// The field being decided.
    pub field: TaskFieldKind,
    /// Which side wins it.
    pub side: MergeSide,
}

/// The strategies a client may choose to settle a [`ConflictRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Discard the local change and adopt the authoritative state.
    KeepTheirs,
    /// Resubmit the whole local change against the authoritative version.
    Overwrite,
    /// Resubmit only the fields chosen as [`MergeSide::Mine`]. Fields not
    /// listed keep their authoritative value.
    Merge(Vec<FieldChoice>),
}
