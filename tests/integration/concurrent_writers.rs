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

//! Integration tests for concurrent writers.
//!
//! Verifies that when several clients submit a write against the same
//! version at once, exactly one is applied and every other one gets a
//! conflict record carrying the winner's version.

mod common;

use common::{Client, start_board};
use taskboard_proto::board::{ClientMessage, ServerMessage};
use taskboard_proto::task::{TaskField, TaskId, TaskPatch};

fn rename(request_id: u64, task_id: TaskId, expected_version: u64, title: &str) -> ClientMessage {
    ClientMessage::UpdateTask {
        request_id,
        task_id,
        expected_version,
        patch: TaskPatch::from(TaskField::Title(title.into())),
    }
}

#[tokio::test]
async fn two_writers_one_winner() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let mut bob = Client::connect(addr, "tok-bob").await;
    let task = alice.create(1, "race").await;

    // Both writes are in flight before either reply is read.
    alice.send(&rename(2, task.id, 0, "alice wins")).await;
    bob.send(&rename(3, task.id, 0, "bob wins")).await;

    let replies = [alice.reply(2).await, bob.reply(3).await];
    let applied: Vec<_> = replies
        .iter()
        .filter_map(|r| match r {
            ServerMessage::Applied { task, .. } => Some(task),
            _ => None,
        })
        .collect();
    let conflicts: Vec<_> = replies
        .iter()
        .filter_map(|r| match r {
            ServerMessage::Conflict { record, .. } => Some(record),
            _ => None,
        })
        .collect();

    assert_eq!(applied.len(), 1, "replies: {replies:?}");
    assert_eq!(conflicts.len(), 1, "replies: {replies:?}");
    assert_eq!(applied[0].version, 1);
    assert_eq!(conflicts[0].authoritative.version, 1);
    assert_eq!(conflicts[0].authoritative.title, applied[0].title);
}

#[tokio::test]
async fn many_writers_one_winner() {
    let addr = start_board().await;
    let mut creator = Client::connect(addr, "tok-carol").await;
    let task_id = creator.create(1, "stampede").await.id;

    let mut handles = Vec::new();
    for i in 0..6u64 {
        let token = ["tok-alice", "tok-bob", "tok-carol"][usize::try_from(i % 3).unwrap()];
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr, token).await;
            client
                .send(&rename(100 + i, task_id, 0, &format!("writer {i}")))
                .await;
            client.reply(100 + i).await
        }));
    }

    let mut applied = 0;
    let mut conflicted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ServerMessage::Applied { task, .. } => {
                applied += 1;
                assert_eq!(task.version, 1);
            }
            ServerMessage::Conflict { record, .. } => {
                conflicted += 1;
                assert_eq!(record.authoritative.version, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(conflicted, 5);

    let tasks = creator.full_state().await;
    assert_eq!(tasks[0].version, 1);
}

#[tokio::test]
async fn sequential_writes_bump_version_by_one() {
    let addr = start_board().await;
    let mut alice = Client::connect(addr, "tok-alice").await;
    let task = alice.create(1, "v0").await;

    for v in 0..5u64 {
        alice
            .send(&rename(10 + v, task.id, v, &format!("v{}", v + 1)))
            .await;
        match alice.reply(10 + v).await {
            ServerMessage::Applied { task, .. } => assert_eq!(task.version, v + 1),
            other => panic!("expected Applied, got {other:?}"),
        }
    }
}
