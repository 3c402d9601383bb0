// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for presence and typing indicators.
//!
//! Verifies:
//! 1. Every connect and disconnect publishes the full online list.
//! 2. Typing notices reach everyone but the typist.
//! 3. The online list reflects who is typing into which task.

mod common;

use common::{Client, start_board};
use taskboard_proto::board::{ClientMessage, ServerMessage};
use taskboard_proto::presence::OnlineUser;
use taskboard_proto::typing::TypingNotice;

fn names(online: &[OnlineUser]) -> Vec<&str> {
    online.iter().map(|o| o.user.name.as_str()).collect()
}

async fn next_presence(client: &mut Client) -> Vec<OnlineUser> {
    match client
        .recv_until(|m| matches!(m, ServerMessage::PresenceUpdate { .. }))
        .await
    {
        ServerMessage::PresenceUpdate { online } => online,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn connect_and_disconnect_update_presence() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    assert_eq!(names(&next_presence(&mut alice).await), vec!["Alice"]);

    let bob = Client::connect(addr, "tok-bob").await;
    assert_eq!(names(&next_presence(&mut alice).await), vec!["Alice", "Bob"]);

    bob.close().await;
    assert_eq!(names(&next_presence(&mut alice).await), vec!["Alice"]);
}

#[tokio::test]
async fn second_connection_of_same_user_is_listed_once() {
    let addr = start_board().await;
    let mut first = Client::connect(addr, "tok-alice").await;
    next_presence(&mut first).await;

    let second = Client::connect(addr, "tok-alice").await;
    assert_eq!(names(&next_presence(&mut first).await), vec!["Alice"]);
    assert_ne!(first.connection_id, second.connection_id);
}

#[tokio::test]
async fn typing_notices_reach_others_only() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "draft").await;

    alice
        .send(&ClientMessage::TypingStart { task_id: task.id })
        .await;
    let notice = TypingNotice {
        user_id: alice.user.id.clone(),
        task_id: task.id,
    };
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::TypingStarted(_)))
            .await,
        ServerMessage::TypingStarted(notice.clone())
    );
    let online = next_presence(&mut bob).await;
    let alice_entry = online.iter().find(|o| o.user.id == alice.user.id).unwrap();
    assert!(alice_entry.is_typing);
    assert_eq!(alice_entry.typing_task_id, Some(task.id));

    let own = alice.sync().await;
    assert!(
        !own.iter()
            .any(|m| matches!(m, ServerMessage::TypingStarted(_))),
        "typist got its own notice: {own:?}"
    );

    alice
        .send(&ClientMessage::TypingStop { task_id: task.id })
        .await;
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::TypingStopped(_)))
            .await,
        ServerMessage::TypingStopped(notice)
    );
    let online = next_presence(&mut bob).await;
    assert!(online.iter().all(|o| !o.is_typing));
}
