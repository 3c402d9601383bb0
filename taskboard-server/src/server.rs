//! Board server core: shared state, WebSocket handler and request dispatch.
//!
//! Each connection authenticates with its first frame, is registered for
//! presence and subscribed to the board topic, and then has its requests
//! dispatched one at a time. Replies go straight back to the requester;
//! events for everyone else go through the [`BroadcastRouter`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use taskboard_proto::activity::ActionVerb;
use taskboard_proto::board::{ClientMessage, ConnectionId, RejectKind, RequestId, ServerMessage};
use taskboard_proto::codec;
use taskboard_proto::conflict::{ConflictRecord, Resolution};
use taskboard_proto::presence::{UserId, UserRef};
use taskboard_proto::task::{NewTask, Task, TaskField, TaskId, TaskPatch, ValidationError};
use taskboard_proto::typing::TypingNotice;
use tokio::sync::mpsc;

use crate::assign;
use crate::audit::{AuditSink, InMemoryAuditLog};
use crate::auth::{AuthError, Authenticator};
use crate::broadcast::{self, BroadcastRouter, Outbound, Topic};
use crate::conflict::{self, Resubmission};
use crate::error::BoardError;
use crate::locks::{EditLockManager, LockOutcome};
use crate::registry::ConnectionRegistry;
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::versioning::{VersionController, verb_for_patch};

/// Default maximum accepted frame size in bytes (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Number of audit entries returned when a request asks for zero.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;

/// How long a closing connection's writer may spend flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared board state: one instance per server, handed to every connection.
pub struct BoardState {
    /// Live connections and their presence.
    pub registry: ConnectionRegistry,
    /// Event fan-out.
    pub router: BroadcastRouter,
    /// Soft edit locks.
    pub locks: EditLockManager,
    /// Versioned access to the task store.
    pub versions: VersionController,
    auth: Arc<dyn Authenticator>,
    max_frame_size: usize,
}

impl BoardState {
    /// Creates a board over the given collaborators with the default frame
    /// size limit.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        audit: Arc<dyn AuditSink>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self::with_config(DEFAULT_MAX_FRAME_SIZE, store, audit, auth)
    }

    /// Creates a board with a custom frame size limit.
    #[must_use]
    pub fn with_config(
        max_frame_size: usize,
        store: Arc<dyn TaskStore>,
        audit: Arc<dyn AuditSink>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            router: BroadcastRouter::new(),
            locks: EditLockManager::new(),
            versions: VersionController::new(store, audit),
            auth,
            max_frame_size,
        }
    }

    /// Creates a board backed by an empty in-memory store and audit log.
    #[must_use]
    pub fn in_memory(auth: Arc<dyn Authenticator>) -> Self {
        Self::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryAuditLog::new()),
            auth,
        )
    }

    /// Verifies a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the token is missing or unknown.
    pub fn authenticate(&self, token: &str) -> Result<UserRef, AuthError> {
        self.auth.verify(token)
    }

    /// Registers an authenticated connection and tells everyone who is online.
    pub async fn connect(&self, connection_id: ConnectionId, user: UserRef, outbound: Outbound) {
        tracing::info!(connection_id = %connection_id, user = %user.id, "user connected");
        if self
            .router
            .subscribe(Topic::Board, connection_id, outbound)
            .await
            .is_some()
        {
            tracing::warn!(connection_id = %connection_id, "replaced existing subscription");
        }
        self.registry.register(connection_id, user).await;
        self.publish_presence().await;
    }

    /// Tears a connection down: unsubscribe, unregister, release the user's
    /// edit locks (announcing each) and publish the new presence list.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.router.unsubscribe_all(connection_id).await;
        let Some(user) = self.registry.unregister(connection_id).await else {
            return;
        };

        let released = self.locks.release_all(&user.id);
        for task_id in released {
            tracing::debug!(task_id = %task_id, user = %user.id, "releasing lock on disconnect");
            let event = ServerMessage::EditLockReleased {
                task_id,
                holder: user.id.clone(),
            };
            self.router.publish(Topic::Board, &event, None).await;
        }

        self.publish_presence().await;
        tracing::info!(connection_id = %connection_id, user = %user.id, "user disconnected");
    }

    /// Deletes a task and drops its edit lock in one step, returning the
    /// removed task and the former lock holder.
    ///
    /// Runs under the lock manager's mutex, so a concurrent lock request sees
    /// the task either alive and unlocked-or-held, or gone.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] or [`BoardError::VersionConflict`].
    pub fn delete_task(
        &self,
        actor: &UserId,
        task_id: TaskId,
        expected_version: u64,
    ) -> Result<(Task, Option<UserId>), BoardError> {
        self.locks.remove_task_with(task_id, || {
            self.versions.delete(actor, &task_id, expected_version)
        })
    }

    /// Handles one request from an authenticated connection, returning the
    /// direct reply (if the request has one).
    #[allow(clippy::too_many_lines)]
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        msg: ClientMessage,
    ) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Authenticate { .. } => {
                tracing::warn!(connection_id = %connection_id, "duplicate authentication request");
                Some(ServerMessage::Error {
                    reason: "already authenticated".to_string(),
                })
            }
            ClientMessage::CreateTask { request_id, task } => {
                Some(self.create(connection_id, user, request_id, task).await)
            }
            ClientMessage::UpdateTask {
                request_id,
                task_id,
                expected_version,
                patch,
            } => {
                let verb = verb_for_patch(&patch);
                Some(
                    self.mutate(connection_id, user, request_id, task_id, expected_version, patch, verb)
                        .await,
                )
            }
            ClientMessage::MoveTask {
                request_id,
                task_id,
                expected_version,
                status,
            } => Some(
                self.mutate(
                    connection_id,
                    user,
                    request_id,
                    task_id,
                    expected_version,
                    TaskPatch::from(TaskField::Status(status)),
                    ActionVerb::Move,
                )
                .await,
            ),
            ClientMessage::AssignTask {
                request_id,
                task_id,
                expected_version,
                user: assignee,
            } => Some(
                self.mutate(
                    connection_id,
                    user,
                    request_id,
                    task_id,
                    expected_version,
                    TaskPatch::from(TaskField::AssignedUser(assignee)),
                    ActionVerb::Assign,
                )
                .await,
            ),
            ClientMessage::SmartAssign {
                request_id,
                task_id,
                expected_version,
            } => Some(
                self.smart_assign(connection_id, user, request_id, task_id, expected_version)
                    .await,
            ),
            ClientMessage::DeleteTask {
                request_id,
                task_id,
                expected_version,
            } => Some(
                self.delete(connection_id, user, request_id, task_id, expected_version)
                    .await,
            ),
            ClientMessage::ResolveConflict {
                request_id,
                record,
                resolution,
            } => Some(
                self.resolve_conflict(connection_id, user, request_id, &record, &resolution)
                    .await,
            ),
            ClientMessage::AcquireEditLock { task_id } => {
                Some(self.acquire_lock(connection_id, &user.id, task_id).await)
            }
            ClientMessage::ReleaseEditLock { task_id } => {
                if !self.locks.release(task_id, &user.id) {
                    tracing::debug!(task_id = %task_id, user = %user.id, "release of unheld lock ignored");
                    return None;
                }
                let event = ServerMessage::EditLockReleased {
                    task_id,
                    holder: user.id.clone(),
                };
                self.router
                    .publish(Topic::Board, &event, Some(connection_id))
                    .await;
                Some(event)
            }
            ClientMessage::TypingStart { task_id } => {
                self.set_typing(connection_id, task_id, true).await;
                None
            }
            ClientMessage::TypingStop { task_id } => {
                self.set_typing(connection_id, task_id, false).await;
                None
            }
            ClientMessage::RequestFullState => {
                let mut tasks = self.versions.list();
                self.locks.annotate_all(&mut tasks);
                Some(ServerMessage::FullState { tasks })
            }
            ClientMessage::RequestActivity { limit, filter } => {
                let limit = match usize::try_from(limit) {
                    Ok(0) => DEFAULT_ACTIVITY_LIMIT,
                    Ok(n) => n,
                    Err(_) => usize::MAX,
                };
                Some(ServerMessage::Activity {
                    entries: self.versions.recent_activity(limit, &filter),
                })
            }
            ClientMessage::RequestUsers => Some(ServerMessage::Users {
                users: self.auth.users(),
            }),
            ClientMessage::Ping => Some(ServerMessage::Pong),
        }
    }

    async fn create(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        request_id: RequestId,
        task: NewTask,
    ) -> ServerMessage {
        if let Err(e) = self.check_assignee(task.assigned_user.as_ref()) {
            return rejected(request_id, &e);
        }
        match self.versions.create(&user.id, task) {
            Ok(task) => {
                let event = ServerMessage::TaskCreated { task: task.clone() };
                self.router
                    .publish(Topic::Board, &event, Some(connection_id))
                    .await;
                ServerMessage::Applied { request_id, task }
            }
            Err(e) => rejected(request_id, &e),
        }
    }

    /// Runs a patch through the version check and reports the outcome.
    #[allow(clippy::too_many_arguments)]
    async fn mutate(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        request_id: RequestId,
        task_id: TaskId,
        expected_version: u64,
        patch: TaskPatch,
        verb: ActionVerb,
    ) -> ServerMessage {
        if let Some(Some(assignee)) = patch.assignee()
            && let Err(e) = self.check_assignee(Some(assignee))
        {
            return rejected(request_id, &e);
        }

        match self
            .versions
            .update(&user.id, &task_id, expected_version, &patch, verb)
        {
            Ok(mut task) => {
                self.locks.annotate(&mut task);
                let event = ServerMessage::TaskUpdated {
                    task: task.clone(),
                    verb,
                };
                self.router
                    .publish(Topic::Board, &event, Some(connection_id))
                    .await;
                ServerMessage::Applied { request_id, task }
            }
            Err(BoardError::VersionConflict(current)) => {
                let mut current = *current;
                self.locks.annotate(&mut current);
                tracing::info!(
                    task_id = %task_id,
                    user = %user.id,
                    expected_version,
                    current_version = current.version,
                    "write lost version check"
                );
                ServerMessage::Conflict {
                    request_id,
                    record: conflict::conflict_record(patch, current, &user.id, verb),
                }
            }
            Err(e) => rejected(request_id, &e),
        }
    }

    async fn smart_assign(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        request_id: RequestId,
        task_id: TaskId,
        expected_version: u64,
    ) -> ServerMessage {
        let candidates: Vec<UserId> = self.auth.users().into_iter().map(|u| u.id).collect();
        let tasks = self.versions.list();
        tracing::debug!(
            task_id = %task_id,
            workload = ?assign::workload_distribution(&tasks, &candidates),
            "smart-assign workload"
        );

        let Some(chosen) = assign::find_optimal_user(&tasks, &candidates) else {
            return ServerMessage::Rejected {
                request_id,
                kind: RejectKind::Validation,
                reason: "no users available for assignment".to_string(),
            };
        };

        self.mutate(
            connection_id,
            user,
            request_id,
            task_id,
            expected_version,
            TaskPatch::from(TaskField::AssignedUser(Some(chosen))),
            ActionVerb::SmartAssign,
        )
        .await
    }

    async fn delete(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        request_id: RequestId,
        task_id: TaskId,
        expected_version: u64,
    ) -> ServerMessage {
        match self.delete_task(&user.id, task_id, expected_version) {
            Ok((_, former_holder)) => {
                if let Some(holder) = former_holder {
                    let event = ServerMessage::EditLockReleased { task_id, holder };
                    self.router.publish(Topic::Board, &event, None).await;
                }
                self.router
                    .publish(
                        Topic::Board,
                        &ServerMessage::TaskDeleted { task_id },
                        Some(connection_id),
                    )
                    .await;
                ServerMessage::Removed {
                    request_id,
                    task_id,
                }
            }
            Err(BoardError::VersionConflict(current)) => {
                let mut current = *current;
                self.locks.annotate(&mut current);
                ServerMessage::Conflict {
                    request_id,
                    record: conflict::conflict_record(
                        TaskPatch::new(),
                        current,
                        &user.id,
                        ActionVerb::Delete,
                    ),
                }
            }
            Err(e) => rejected(request_id, &e),
        }
    }

    async fn resolve_conflict(
        &self,
        connection_id: ConnectionId,
        user: &UserRef,
        request_id: RequestId,
        record: &ConflictRecord,
        resolution: &Resolution,
    ) -> ServerMessage {
        match conflict::resolve(record, resolution) {
            Resubmission::Nothing => {
                tracing::debug!(task_id = %record.task_id, user = %user.id, "conflict settled locally");
                ServerMessage::Resolved { request_id }
            }
            Resubmission::Mutation {
                expected_version,
                patch,
                verb,
            } => {
                self.mutate(
                    connection_id,
                    user,
                    request_id,
                    record.task_id,
                    expected_version,
                    patch,
                    verb,
                )
                .await
            }
        }
    }

    async fn acquire_lock(
        &self,
        connection_id: ConnectionId,
        user: &UserId,
        task_id: TaskId,
    ) -> ServerMessage {
        let exists = || self.versions.get(&task_id).is_ok();
        match self.locks.try_acquire(task_id, user, exists) {
            Ok(LockOutcome::Acquired) => {
                let event = ServerMessage::EditLockGranted {
                    task_id,
                    holder: user.clone(),
                };
                self.router
                    .publish(Topic::Board, &event, Some(connection_id))
                    .await;
                event
            }
            Ok(LockOutcome::AlreadyHeld) => ServerMessage::EditLockGranted {
                task_id,
                holder: user.clone(),
            },
            Err(BoardError::LockDenied { task_id, holder }) => {
                tracing::debug!(task_id = %task_id, user = %user, holder = %holder, "edit lock denied");
                ServerMessage::EditLockDenied { task_id, holder }
            }
            Err(e) => rejected(0, &e),
        }
    }

    async fn set_typing(&self, connection_id: ConnectionId, task_id: TaskId, typing: bool) {
        let Some(user) = self
            .registry
            .set_typing(connection_id, typing.then_some(task_id))
            .await
        else {
            return;
        };
        let notice = TypingNotice {
            user_id: user.id,
            task_id,
        };
        let event = if typing {
            ServerMessage::TypingStarted(notice)
        } else {
            ServerMessage::TypingStopped(notice)
        };
        self.router
            .publish(Topic::Board, &event, Some(connection_id))
            .await;
        self.publish_presence().await;
    }

    async fn publish_presence(&self) {
        let online = self.registry.list_online().await;
        self.router
            .publish(Topic::Board, &ServerMessage::PresenceUpdate { online }, None)
            .await;
    }

    fn check_assignee(&self, assignee: Option<&UserId>) -> Result<(), BoardError> {
        match assignee {
            Some(id) if !self.auth.users().iter().any(|u| &u.id == id) => {
                Err(ValidationError::UnknownUser(id.clone()).into())
            }
            _ => Ok(()),
        }
    }

    fn frame_too_large(&self, len: usize) -> Option<ServerMessage> {
        (len > self.max_frame_size).then(|| ServerMessage::Error {
            reason: format!("frame too large: {len} bytes (max {})", self.max_frame_size),
        })
    }
}

fn rejected(request_id: RequestId, err: &BoardError) -> ServerMessage {
    ServerMessage::Rejected {
        request_id,
        kind: err.reject_kind().unwrap_or(RejectKind::Validation),
        reason: err.to_string(),
    }
}

/// Handles an upgraded WebSocket connection for one client.
///
/// The connection lifecycle:
/// 1. Wait for an `Authenticate` message; reject and close on failure.
/// 2. Send `Welcome`, register presence and subscribe to the board.
/// 3. Dispatch requests until the socket closes.
/// 4. Disconnect: release locks and publish presence.
pub async fn handle_socket(socket: WebSocket, state: Arc<BoardState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let user = match wait_for_authenticate(&mut ws_receiver, &state).await {
        Some(Ok(user)) => user,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "authentication failed");
            let reject = ServerMessage::Rejected {
                request_id: 0,
                kind: RejectKind::Auth,
                reason: e.to_string(),
            };
            let _ = send_server_msg(&mut ws_sender, &reject).await;
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
        None => {
            tracing::warn!("connection closed before authentication");
            return;
        }
    };

    let connection_id = ConnectionId::new();
    let welcome = ServerMessage::Welcome {
        connection_id,
        user: user.clone(),
    };
    if let Err(e) = send_server_msg(&mut ws_sender, &welcome).await {
        tracing::error!(connection_id = %connection_id, error = %e, "failed to send Welcome");
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    state.connect(connection_id, user.clone(), tx.clone()).await;

    let mut write_task =
        tokio::spawn(async move { write_loop(&mut ws_sender, rx, connection_id).await });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    if let Some(reply) =
                        handle_binary_message(connection_id, &user, &data, &reader_state).await
                        && !broadcast::send_direct(&tx, &reply)
                    {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::info!(connection_id = %connection_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            // The reader owned the last direct sender; unsubscribing drops the
            // router's, so the writer ends once the queue is flushed.
            state.disconnect(connection_id).await;
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut write_task)
                .await
                .is_err()
            {
                tracing::warn!(connection_id = %connection_id, "writer did not drain in time");
                write_task.abort();
            }
        }
        _ = &mut write_task => {
            read_task.abort();
            state.disconnect(connection_id).await;
        }
    }
}

/// Forwards queued frames to the socket until every sender is gone or a
/// write fails.
async fn write_loop<S>(
    sink: &mut S,
    mut rx: mpsc::UnboundedReceiver<Message>,
    connection_id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
{
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            tracing::warn!(connection_id = %connection_id, "WebSocket write failed");
            return;
        }
    }
    let _ = sink.close().await;
}

/// Waits for the first binary frame, expecting `Authenticate`.
///
/// Returns `None` if the socket closes first.
async fn wait_for_authenticate(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &BoardState,
) -> Option<Result<UserRef, AuthError>> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                if state.frame_too_large(data.len()).is_some() {
                    return Some(Err(AuthError::NotAuthenticated));
                }
                return Some(match codec::decode::<ClientMessage>(&data) {
                    Ok(ClientMessage::Authenticate { token }) => state.authenticate(&token),
                    Ok(other) => {
                        tracing::warn!(msg = ?other, "expected Authenticate, got different message");
                        Err(AuthError::NotAuthenticated)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to decode authentication message");
                        Err(AuthError::NotAuthenticated)
                    }
                });
            }
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames during authentication.
            }
        }
    }
    None
}

/// Decodes and dispatches one frame from an authenticated connection.
async fn handle_binary_message(
    connection_id: ConnectionId,
    user: &UserRef,
    data: &[u8],
    state: &BoardState,
) -> Option<ServerMessage> {
    if let Some(err) = state.frame_too_large(data.len()) {
        tracing::warn!(
            connection_id = %connection_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        return Some(err);
    }

    match codec::decode::<ClientMessage>(data) {
        Ok(msg) => state.dispatch(connection_id, user, msg).await,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "failed to decode message");
            Some(ServerMessage::Error {
                reason: format!("malformed frame: {e}"),
            })
        }
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = codec::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts a board server with an in-memory store on the given address and
/// returns the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    auth: Arc<dyn Authenticator>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BoardState::in_memory(auth))).await
}

/// Starts a board server with a pre-built [`BoardState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BoardState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "board server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<BoardState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
