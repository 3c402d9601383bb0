//! Board wire protocol: the messages exchanged over a client's WebSocket.
//!
//! Every binary frame carries exactly one postcard-encoded message. Clients
//! send [`ClientMessage`]; the server answers with [`ServerMessage`]. The
//! first client frame must be [`ClientMessage::Authenticate`].
//!
//! Mutation requests carry a client-chosen `request_id` that is echoed back in
//! the direct reply ([`ServerMessage::Applied`], [`ServerMessage::Removed`],
//! [`ServerMessage::Conflict`], [`ServerMessage::Rejected`] or
//! [`ServerMessage::Resolved`]), so a client can match replies to requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::{ActionVerb, ActivityFilter, AuditEntry};
use crate::conflict::{ConflictRecord, Resolution};
use crate::presence::{OnlineUser, UserId, UserRef};
use crate::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};
use crate::typing::TypingNotice;

/// Client-chosen correlation id for a request.
pub type RequestId = u64;

/// Identifier of one live connection. Assigned by the server on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a fresh, time-ordered connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Presents a session token. Must be the first message on a connection.
    Authenticate {
        /// Opaque token issued by the auth collaborator.
        token: String,
    },

    /// Creates a task. Carries no expected version.
    CreateTask {
        /// Correlation id.
        request_id: RequestId,
        /// Field set of the new task.
        task: NewTask,
    },

    /// Applies a partial update.
    UpdateTask {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        task_id: TaskId,
        /// Version the client last saw.
        expected_version: u64,
        /// Fields to replace.
        patch: TaskPatch,
    },

    /// Moves a task to another column.
    MoveTask {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        task_id: TaskId,
        /// Version the client last saw.
        expected_version: u64,
        /// Destination column.
        status: TaskStatus,
    },

    /// Assigns (or unassigns) a task manually.
    AssignTask {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        task_id: TaskId,
        /// Version the client last saw.
        expected_version: u64,
        /// New assignee, `None` to unassign.
        user: Option<UserId>,
    },

    /// Assigns the task to the least-loaded known user.
    SmartAssign {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        task_id: TaskId,
        /// Version the client last saw.
        expected_version: u64,
    },

    /// Deletes a task.
    DeleteTask {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        task_id: TaskId,
        /// Version the client last saw.
        expected_version: u64,
    },

    /// Settles a previously received conflict with the chosen strategy.
    ResolveConflict {
        /// Correlation id.
        request_id: RequestId,
        /// The conflict record exactly as it was received.
        record: ConflictRecord,
        /// The chosen strategy.
        resolution: Resolution,
    },

    /// Asks for the soft edit lock on a task.
    AcquireEditLock {
        /// Task to lock.
        task_id: TaskId,
    },

    /// Gives up the soft edit lock on a task.
    ReleaseEditLock {
        /// Task to unlock.
        task_id: TaskId,
    },

    /// The user started typing into a task form.
    TypingStart {
        /// Task being typed into.
        task_id: TaskId,
    },

    /// The user stopped typing into a task form.
    TypingStop {
        /// Task that was being typed into.
        task_id: TaskId,
    },

    /// Requests every task, for reconciliation after a reconnect.
    RequestFullState,

    /// Requests the most recent audit entries.
    RequestActivity {
        /// Maximum number of entries to return; 0 asks for the default.
        limit: u32,
        /// Restricts the entries to one task and/or one actor.
        filter: ActivityFilter,
    },

    /// Requests every user known to the server.
    RequestUsers,

    /// Connection health check.
    Ping,
}

/// Category of a terminal request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    /// Malformed or out-of-range fields.
    Validation,
    /// Unknown or deleted task.
    NotFound,
    /// Missing or invalid credential.
    Auth,
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Authentication succeeded.
    Welcome {
        /// Id assigned to this connection.
        connection_id: ConnectionId,
        /// The authenticated user.
        user: UserRef,
    },

    /// Reply: the mutation was accepted; `task` is the new authoritative state.
    Applied {
        /// Echoed correlation id.
        request_id: RequestId,
        /// Task after the mutation.
        task: Task,
    },

    /// Reply: the delete was accepted.
    Removed {
        /// Echoed correlation id.
        request_id: RequestId,
        /// The deleted task.
        task_id: TaskId,
    },

    /// Reply: the mutation lost an optimistic concurrency check.
    Conflict {
        /// Echoed correlation id.
        request_id: RequestId,
        /// Submitted change, authoritative task and reason.
        record: ConflictRecord,
    },

    /// Reply: the request failed terminally.
    Rejected {
        /// Echoed correlation id (0 for requests that carry none).
        request_id: RequestId,
        /// Failure category.
        kind: RejectKind,
        /// Human-readable detail.
        reason: String,
    },

    /// Reply: a `KeepTheirs` resolution was acknowledged; nothing was written.
    Resolved {
        /// Echoed correlation id.
        request_id: RequestId,
    },

    /// Full list of online users. Sent on every presence change.
    PresenceUpdate {
        /// Everyone currently connected.
        online: Vec<OnlineUser>,
    },

    /// An edit lock was granted.
    EditLockGranted {
        /// Locked task.
        task_id: TaskId,
        /// Lock holder.
        holder: UserId,
    },

    /// An edit lock request was denied.
    EditLockDenied {
        /// Requested task.
        task_id: TaskId,
        /// Current holder.
        holder: UserId,
    },

    /// An edit lock was released.
    EditLockReleased {
        /// Unlocked task.
        task_id: TaskId,
        /// Former holder.
        holder: UserId,
    },

    /// Another client created a task.
    TaskCreated {
        /// The new task.
        task: Task,
    },

    /// Another client changed a task.
    TaskUpdated {
        /// Task after the change.
        task: Task,
        /// What kind of change it was.
        verb: ActionVerb,
    },

    /// Another client deleted a task.
    TaskDeleted {
        /// The deleted task.
        task_id: TaskId,
    },

    /// Another user started typing.
    TypingStarted(TypingNotice),

    /// Another user stopped typing.
    TypingStopped(TypingNotice),

    /// Every task on the board, newest first.
    FullState {
        /// All tasks.
        tasks: Vec<Task>,
    },

    /// Most recent audit entries, newest first.
    Activity {
        /// The entries.
        entries: Vec<AuditEntry>,
    },

    /// Every user known to the server, sorted by id.
    Users {
        /// Assignable users.
        users: Vec<UserRef>,
    },

    /// Answer to [`ClientMessage::Ping`].
    Pong,

    /// Protocol-level error not tied to a request.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}
