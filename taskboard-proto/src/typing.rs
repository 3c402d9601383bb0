//! Typing indicator payload for real-time "is typing" hints.

use serde::{Deserialize, Serialize};

use crate::presence::UserId;
use crate::task::TaskId;

/// Carried by typing start/stop events: who is typing into which task form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    /// The user who started or stopped typing.
    pub user_id: UserId,
    /// The task whose form is being edited.
    pub task_id: TaskId,
}
