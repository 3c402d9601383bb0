//! Shared helpers for the board integration tests: an in-process server and a
//! thin WebSocket client speaking the board protocol.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskboard_proto::board::{ClientMessage, ConnectionId, RequestId, ServerMessage};
use taskboard_proto::codec;
use taskboard_proto::presence::UserRef;
use taskboard_proto::task::{NewTask, Task};
use taskboard_server::auth::{Authenticator, StaticTokenAuthenticator};
use taskboard_server::server::{self, BoardState};
use tokio_tungstenite::tungstenite;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Alice, Bob and Carol, with tokens `tok-alice`, `tok-bob`, `tok-carol`.
pub fn authenticator() -> Arc<dyn Authenticator> {
    Arc::new(
        StaticTokenAuthenticator::new()
            .with_user("tok-alice", UserRef::new("alice", "Alice"))
            .with_user("tok-bob", UserRef::new("bob", "Bob"))
            .with_user("tok-carol", UserRef::new("carol", "Carol")),
    )
}

/// Starts a board on an OS-assigned port.
pub async fn start_board() -> SocketAddr {
    let (addr, _handle) = server::start_server("127.0.0.1:0", authenticator())
        .await
        .expect("failed to start board server");
    addr
}

/// Starts a board with a custom frame size limit.
pub async fn start_board_with_frame_limit(max_frame_size: usize) -> SocketAddr {
    let state = BoardState::with_config(
        max_frame_size,
        Arc::new(taskboard_server::store::InMemoryTaskStore::new()),
        Arc::new(taskboard_server::audit::InMemoryAuditLog::new()),
        authenticator(),
    );
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::new(state))
        .await
        .expect("failed to start board server");
    addr
}

/// One authenticated client connection.
pub struct Client {
    ws: Ws,
    pub connection_id: ConnectionId,
    pub user: UserRef,
}

impl Client {
    /// Connects and authenticates with `token`, waiting for `Welcome`.
    pub async fn connect(addr: SocketAddr, token: &str) -> Self {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        send_on(
            &mut ws,
            &ClientMessage::Authenticate {
                token: token.to_string(),
            },
        )
        .await;

        match recv_on(&mut ws).await {
            ServerMessage::Welcome {
                connection_id,
                user,
            } => Self {
                ws,
                connection_id,
                user,
            },
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    pub async fn send(&mut self, msg: &ClientMessage) {
        send_on(&mut self.ws, msg).await;
    }

    /// Sends a raw binary frame.
    pub async fn send_raw(&mut self, bytes: Vec<u8>) {
        self.ws
            .send(tungstenite::Message::Binary(bytes.into()))
            .await
            .unwrap();
    }

    pub async fn recv(&mut self) -> ServerMessage {
        recv_on(&mut self.ws).await
    }

    /// Reads until a message matches `pred`, returning it and dropping
    /// everything before it.
    pub async fn recv_until(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = self.recv().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    /// Reads until a message matches `pred`, returning everything read.
    pub async fn collect_until(
        &mut self,
        pred: impl Fn(&ServerMessage) -> bool,
    ) -> Vec<ServerMessage> {
        let mut seen = Vec::new();
        loop {
            let msg = self.recv().await;
            let done = pred(&msg);
            seen.push(msg);
            if done {
                return seen;
            }
        }
    }

    /// Waits for the direct reply carrying `request_id`.
    pub async fn reply(&mut self, request_id: RequestId) -> ServerMessage {
        self.recv_until(|m| reply_id(m) == Some(request_id)).await
    }

    /// Creates a task and returns it as applied.
    pub async fn create(&mut self, request_id: RequestId, title: &str) -> Task {
        self.send(&ClientMessage::CreateTask {
            request_id,
            task: NewTask::titled(title),
        })
        .await;
        match self.reply(request_id).await {
            ServerMessage::Applied { task, .. } => task,
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    /// Round-trips a `Ping`, returning everything received before the `Pong`.
    pub async fn sync(&mut self) -> Vec<ServerMessage> {
        self.send(&ClientMessage::Ping).await;
        let mut seen = self
            .collect_until(|m| matches!(m, ServerMessage::Pong))
            .await;
        seen.pop();
        seen
    }

    /// Fetches the full task list.
    pub async fn full_state(&mut self) -> Vec<Task> {
        self.send(&ClientMessage::RequestFullState).await;
        match self
            .recv_until(|m| matches!(m, ServerMessage::FullState { .. }))
            .await
        {
            ServerMessage::FullState { tasks } => tasks,
            _ => unreachable!(),
        }
    }

    pub async fn close(mut self) {
        self.ws.close(None).await.unwrap();
    }
}

/// Correlation id of a direct reply.
pub const fn reply_id(msg: &ServerMessage) -> Option<RequestId> {
    match msg {
        ServerMessage::Applied { request_id, .. }
        | ServerMessage::Removed { request_id, .. }
        | ServerMessage::Conflict { request_id, .. }
        | ServerMessage::Rejected { request_id, .. }
        | ServerMessage::Resolved { request_id } => Some(*request_id),
        _ => None,
    }
}

async fn send_on(ws: &mut Ws, msg: &ClientMessage) {
    let bytes = codec::encode(msg).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn recv_on(ws: &mut Ws) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed")
            .unwrap();
        if let tungstenite::Message::Binary(bytes) = msg {
            return codec::decode(&bytes).unwrap();
        }
    }
}
