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

//! Integration tests for soft edit locks.
//!
//! Verifies:
//! 1. Acquire, deny, release, acquire again, with broadcasts to other clients.
//! 2. Task snapshots mirror the lock state.
//! 3. A disconnect releases the user's locks exactly once.

mod common;

use common::{Client, start_board};
use taskboard_proto::board::{ClientMessage, ServerMessage};
use taskboard_proto::presence::UserId;

#[tokio::test]
async fn acquire_deny_release_acquire() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "contested").await;

    alice
        .send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    assert_eq!(
        alice
            .recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
            .await,
        ServerMessage::EditLockGranted {
            task_id: task.id,
            holder: UserId::from("alice")
        }
    );
    // Bob sees the grant too.
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
            .await,
        ServerMessage::EditLockGranted {
            task_id: task.id,
            holder: UserId::from("alice")
        }
    );

    bob.send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::EditLockDenied { .. }))
            .await,
        ServerMessage::EditLockDenied {
            task_id: task.id,
            holder: UserId::from("alice")
        }
    );

    alice
        .send(&ClientMessage::ReleaseEditLock { task_id: task.id })
        .await;
    let released = ServerMessage::EditLockReleased {
        task_id: task.id,
        holder: UserId::from("alice"),
    };
    assert_eq!(
        alice
            .recv_until(|m| matches!(m, ServerMessage::EditLockReleased { .. }))
            .await,
        released
    );
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::EditLockReleased { .. }))
            .await,
        released
    );

    bob.send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    assert_eq!(
        bob.recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
            .await,
        ServerMessage::EditLockGranted {
            task_id: task.id,
            holder: UserId::from("bob")
        }
    );
}

#[tokio::test]
async fn reacquiring_own_lock_is_granted_without_broadcast() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "mine").await;

    for _ in 0..2 {
        alice
            .send(&ClientMessage::AcquireEditLock { task_id: task.id })
            .await;
        alice
            .recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
            .await;
    }

    let seen = bob.sync().await;
    let grants = seen
        .iter()
        .filter(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
        .count();
    assert_eq!(grants, 1);
}

#[tokio::test]
async fn snapshots_mirror_lock_state() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "watched").await;

    alice
        .send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    alice
        .recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
        .await;

    let tasks = bob.full_state().await;
    assert!(tasks[0].is_being_edited);
    assert_eq!(tasks[0].edit_lock_holder, Some(UserId::from("alice")));
}

#[tokio::test]
async fn disconnect_releases_lock_exactly_once() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "abandoned").await;

    alice
        .send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    alice
        .recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
        .await;
    bob.recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
        .await;

    alice.close().await;

    // Lock releases are published before the presence update that drops Alice.
    let seen = bob
        .collect_until(|m| {
            matches!(m, ServerMessage::PresenceUpdate { online } if online.len() == 1)
        })
        .await;
    let releases: Vec<&ServerMessage> = seen
        .iter()
        .filter(|m| matches!(m, ServerMessage::EditLockReleased { .. }))
        .collect();
    assert_eq!(
        releases,
        vec![&ServerMessage::EditLockReleased {
            task_id: task.id,
            holder: UserId::from("alice")
        }]
    );

    let tasks = bob.full_state().await;
    assert!(!tasks[0].is_being_edited);
    assert_eq!(tasks[0].edit_lock_holder, None);
}

#[tokio::test]
async fn lock_does_not_block_writes() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "advisory").await;

    alice
        .send(&ClientMessage::AcquireEditLock { task_id: task.id })
        .await;
    alice
        .recv_until(|m| matches!(m, ServerMessage::EditLockGranted { .. }))
        .await;

    bob.send(&ClientMessage::AssignTask {
        request_id: 2,
        task_id: task.id,
        expected_version: 0,
        user: Some(UserId::from("bob")),
    })
    .await;
    match bob.reply(2).await {
        ServerMessage::Applied { task, .. } => {
            assert_eq!(task.version, 1);
            assert!(task.is_being_edited);
        }
        other => panic!("expected Applied, got {other:?}"),
    }
}
