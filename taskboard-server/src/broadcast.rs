//! Broadcast router: topic-based fan-out of server events.
//!
//! Every connection subscribes its outbound channel to a [`Topic`]. Publishing
//! encodes the event once and hands a copy to every subscriber except the
//! optional excluded connection (normally the originator, which already got
//! its answer directly). Delivery is best-effort and at-most-once: there is no
//! queue or replay, and a subscriber whose channel is gone is dropped without
//! affecting anyone else.

use std::collections::HashMap;

use axum::extract::ws::Message;
use taskboard_proto::board::{ConnectionId, ServerMessage};
use taskboard_proto::codec;
use tokio::sync::{RwLock, mpsc};

/// Sender half of a connection's outbound WebSocket queue.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// A broadcast channel. There is a single board today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The shared task board.
    Board,
}

/// Topic -> subscriber map.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    topics: RwLock<HashMap<Topic, HashMap<ConnectionId, Outbound>>>,
}

/// Encodes a server message as a binary WebSocket frame.
///
/// Returns `None` (after logging) if encoding fails.
#[must_use]
pub fn frame(msg: &ServerMessage) -> Option<Message> {
    match codec::encode(msg) {
        Ok(bytes) => Some(Message::Binary(bytes.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server message");
            None
        }
    }
}

/// Sends one message on one outbound channel. Returns `false` if the
/// connection is gone or the message could not be encoded.
pub fn send_direct(outbound: &Outbound, msg: &ServerMessage) -> bool {
    frame(msg).is_some_and(|f| outbound.send(f).is_ok())
}

impl BroadcastRouter {
    /// Creates a router with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection to `topic`, returning a replaced sender if the
    /// connection was already subscribed.
    pub async fn subscribe(
        &self,
        topic: Topic,
        connection_id: ConnectionId,
        outbound: Outbound,
    ) -> Option<Outbound> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic)
            .or_default()
            .insert(connection_id, outbound)
    }

    /// Removes a connection from every topic.
    pub async fn unsubscribe_all(&self, connection_id: ConnectionId) {
        let mut topics = self.topics.write().await;
        for subscribers in topics.values_mut() {
            subscribers.remove(&connection_id);
        }
    }

    /// Number of subscribers of `topic`.
    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        let topics = self.topics.read().await;
        topics.get(&topic).map_or(0, HashMap::len)
    }

    /// Delivers `msg` to every subscriber of `topic` except `exclude`.
    ///
    /// Returns the number of subscribers the message was handed to.
    /// Subscribers whose channel has closed are unsubscribed.
    pub async fn publish(
        &self,
        topic: Topic,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(frame) = frame(msg) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let topics = self.topics.read().await;
            let Some(subscribers) = topics.get(&topic) else {
                return 0;
            };
            for (connection_id, outbound) in subscribers {
                if Some(*connection_id) == exclude {
                    continue;
                }
                if outbound.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*connection_id);
                }
            }
        }

        if !dead.is_empty() {
            tracing::debug!(count = dead.len(), "dropping closed subscribers");
            let mut topics = self.topics.write().await;
            if let Some(subscribers) = topics.get_mut(&topic) {
                for connection_id in &dead {
                    subscribers.remove(connection_id);
                }
            }
        }

        delivered
    }
}
