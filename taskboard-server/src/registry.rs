//! Connection registry: who is online, and what they are typing into.
//!
//! One entry per live connection. Entries are created when a connection
//! authenticates and dropped when it closes; nothing here survives a restart.

use std::collections::HashMap;

use taskboard_proto::board::ConnectionId;
use taskboard_proto::presence::{OnlineUser, UserRef};
use taskboard_proto::task::TaskId;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Session {
    user: UserRef,
    typing_task_id: Option<TaskId>,
}

/// Maps live connections to their user and ephemeral UI state.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `user`, replacing any previous entry with
    /// the same connection id.
    pub async fn register(&self, connection_id: ConnectionId, user: UserRef) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            connection_id,
            Session {
                user,
                typing_task_id: None,
            },
        );
    }

    /// Removes a connection, returning its user. Unknown ids are a no-op.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<UserRef> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&connection_id).map(|s| s.user)
    }

    /// Sets (or clears, with `None`) the task a connection is typing into.
    ///
    /// Returns the connection's user, or `None` if the connection is unknown.
    pub async fn set_typing(
        &self,
        connection_id: ConnectionId,
        task_id: Option<TaskId>,
    ) -> Option<UserRef> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&connection_id)?;
        session.typing_task_id = task_id;
        Some(session.user.clone())
    }

    /// Returns every online user once, sorted by id.
    ///
    /// A user with several connections is typing if any of them is.
    pub async fn list_online(&self) -> Vec<OnlineUser> {
        let sessions = self.sessions.read().await;
        let mut by_user: HashMap<&str, OnlineUser> = HashMap::new();
        for session in sessions.values() {
            let entry = by_user
                .entry(session.user.id.as_str())
                .or_insert_with(|| OnlineUser {
                    user: session.user.clone(),
                    is_typing: false,
                    typing_task_id: None,
                });
            if let Some(task_id) = session.typing_task_id {
                entry.is_typing = true;
                entry.typing_task_id.get_or_insert(task_id);
            }
        }
        let mut online: Vec<OnlineUser> = by_user.into_values().collect();
        drop(sessions);
        online.sort_by(|a, b| a.user.id.cmp(&b.user.id));
        online
    }
}
