//! Conflict resolution.
//!
//! When the version check refuses a write, the loser gets a
//! [`ConflictRecord`] instead of a bare failure. Settling it is a retry loop:
//! `Overwrite` and `Merge` turn into a fresh mutation against the
//! authoritative version, which can itself lose again if another writer got
//! there first.

use taskboard_proto::activity::ActionVerb;
use taskboard_proto::conflict::{ConflictReason, ConflictRecord, MergeSide, Resolution};
use taskboard_proto::presence::UserId;
use taskboard_proto::task::{Task, TaskPatch};

/// What the server should do after a client picks a [`Resolution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resubmission {
    /// Nothing to write; the client adopted the authoritative state.
    Nothing,
    /// Submit `patch` with `expected_version` as a normal mutation.
    Mutation {
        /// Version the resubmission is checked against.
        expected_version: u64,
        /// Fields to write.
        patch: TaskPatch,
        /// Verb of the refused write, reused for the audit entry.
        verb: ActionVerb,
    },
}

/// Builds the record handed to the client whose write was refused.
///
/// The reason is [`ConflictReason::LockedByOther`] when someone other than
/// `requester` holds the edit lock on the authoritative task.
#[must_use]
pub fn conflict_record(
    submitted: TaskPatch,
    authoritative: Task,
    requester: &UserId,
    verb: ActionVerb,
) -> ConflictRecord {
    let reason = match &authoritative.edit_lock_holder {
        Some(holder) if holder != requester => ConflictReason::LockedByOther,
        _ => ConflictReason::StaleVersion,
    };
    ConflictRecord {
        task_id: authoritative.id,
        submitted,
        authoritative,
        reason,
        verb,
    }
}

/// Turns a resolution choice into the write (if any) that carries it out.
///
/// Both `Overwrite` and `Merge` use the authoritative version as the new
/// expected version. A merge takes the authoritative task as its baseline and
/// applies only the submitted fields chosen as [`MergeSide::Mine`]; if none
/// are, the merge degenerates to keeping theirs. A lost delete is never
/// replayed: the client re-issues it against the new version itself.
#[must_use]
pub fn resolve(record: &ConflictRecord, resolution: &Resolution) -> Resubmission {
    if matches!(record.verb, ActionVerb::Create | ActionVerb::Delete) {
        return Resubmission::Nothing;
    }
    let patch = match resolution {
        Resolution::KeepTheirs => return Resubmission::Nothing,
        Resolution::Overwrite => record.submitted.clone(),
        Resolution::Merge(choices) => record.submitted.retain(|kind| {
            choices
                .iter()
                .any(|c| c.field == kind && c.side == MergeSide::Mine)
        }),
    };

    if patch.is_empty() {
        return Resubmission::Nothing;
    }

    Resubmission::Mutation {
        expected_version: record.authoritative.version,
        patch,
        verb: record.verb,
    }
}
