//! User identity and presence types for online/typing tracking.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Opaque identifier of a board user, as issued by the auth collaborator.
///
/// Ordering is lexicographic and is used as the deterministic tie-break
/// wherever users are ranked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated user: stable id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    /// Stable user identifier.
    pub id: UserId,
    /// Human-readable display name.
    pub name: String,
}

impl UserRef {
    /// Creates a user reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
        }
    }
}

/// One entry of the online-user list carried by every presence update.
///
/// A user with several open connections appears once; they count as typing
/// if any of their connections is typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// The connected user.
    pub user: UserRef,
    /// Whether the user is currently typing into a task form.
    pub is_typing: bool,
    /// The task being typed into, if any.
    pub typing_task_id: Option<TaskId>,
}
