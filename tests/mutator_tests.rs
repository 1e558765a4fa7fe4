//! Batch trash/restore tests

mod common;

use common::{numbered_ids, refs, FakeMailbox, MockGmailClient};
use gmail_cleaner::error::GmailError;
use gmail_cleaner::models::{FailureReason, MessageRef};
use gmail_cleaner::mutator::{BatchMutator, BatchProgress, Transition};

fn all_refs(ids: &[String]) -> Vec<MessageRef> {
    ids.iter().map(|id| MessageRef::from(id.as_str())).collect()
}

#[tokio::test]
async fn test_failures_are_recorded_and_the_rest_are_still_trashed() {
    let ids = numbered_ids(25);
    let mailbox = FakeMailbox::new(ids.clone()).with_missing(&["msg3", "msg17"]);
    let mutator = BatchMutator::new(&mailbox, 10, 5);

    let outcome = mutator
        .apply(&all_refs(&ids), Transition::Trash, |_| {})
        .await;

    assert_eq!(outcome.attempted, 25);
    assert_eq!(outcome.succeeded, 23);
    assert_eq!(outcome.failed(), 2);
    assert!(!outcome.is_complete_success());

    let failed: Vec<&str> = outcome
        .failures
        .iter()
        .map(|f| f.message_ref.id())
        .collect();
    assert_eq!(failed, vec!["msg3", "msg17"]);
    assert!(outcome
        .failures
        .iter()
        .all(|f| f.reason == FailureReason::NotFound));

    let trashed = mailbox.trashed_ids();
    assert_eq!(trashed.len(), 23);
    assert!(!trashed.contains(&"msg3".to_string()));
    assert_eq!(trashed.last().map(String::as_str), Some("msg24"));
}

#[tokio::test]
async fn test_every_item_is_attempted_exactly_once_in_order() {
    let mut client = MockGmailClient::new();
    let mut seq = mockall::Sequence::new();
    for id in ["a", "b", "c"] {
        client
            .expect_trash()
            .withf(move |message_id| message_id == id)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    let mutator = BatchMutator::new(&client, 100, 10);
    let outcome = mutator
        .apply(&refs(&["a", "b", "c"]), Transition::Trash, |_| {})
        .await;

    assert!(outcome.is_complete_success());
    assert_eq!(outcome.succeeded, 3);
}

#[tokio::test]
async fn test_permission_denied_is_reported_distinctly() {
    let ids = numbered_ids(4);
    let mailbox = FakeMailbox::new(ids.clone()).forbid_all_mutations();
    let mutator = BatchMutator::new(&mailbox, 100, 10);

    let outcome = mutator
        .apply(&all_refs(&ids), Transition::Trash, |_| {})
        .await;

    assert_eq!(outcome.attempted, 4);
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.permission_denied(), 4);
    assert!(mailbox.trashed_ids().is_empty());
}

#[tokio::test]
async fn test_other_errors_keep_their_message() {
    let mut client = MockGmailClient::new();
    client
        .expect_trash()
        .times(2)
        .returning(|id| {
            if id == "bad" {
                Err(GmailError::from_status(503))
            } else {
                Ok(())
            }
        });

    let mutator = BatchMutator::new(&client, 100, 10);
    let outcome = mutator
        .apply(&refs(&["ok", "bad"]), Transition::Trash, |_| {})
        .await;

    assert_eq!(outcome.succeeded, 1);
    match &outcome.failures[0].reason {
        FailureReason::Other(message) => assert!(message.contains("503")),
        other => panic!("unexpected reason: {:?}", other),
    }
}

#[tokio::test]
async fn test_progress_fires_on_interval_and_at_batch_end() {
    let ids = numbered_ids(25);
    let mailbox = FakeMailbox::new(ids.clone());
    let mutator = BatchMutator::new(&mailbox, 10, 4);

    let mut events: Vec<BatchProgress> = Vec::new();
    mutator
        .apply(&all_refs(&ids), Transition::Trash, |p| events.push(*p))
        .await;

    let processed: Vec<usize> = events.iter().map(|p| p.processed).collect();
    // Batches of 10, 10, 5 with a report every 4 items within each batch
    assert_eq!(processed, vec![4, 8, 10, 14, 18, 20, 24, 25]);

    let last = events.last().unwrap();
    assert_eq!(last.total, 25);
    assert_eq!(last.batch, 3);
    assert_eq!(last.batches, 3);
    assert!((last.percent() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_untrash_restores_through_the_same_loop() {
    let ids = numbered_ids(3);
    let mailbox = FakeMailbox::new(ids.clone());
    let mutator = BatchMutator::new(&mailbox, 2, 1);

    let outcome = mutator
        .apply(&all_refs(&ids), Transition::Untrash, |_| {})
        .await;

    assert!(outcome.is_complete_success());
    assert_eq!(mailbox.untrashed_ids(), ids);
    assert!(mailbox.trashed_ids().is_empty());
}

#[tokio::test]
async fn test_empty_input_makes_no_calls() {
    let client = MockGmailClient::new();
    let mutator = BatchMutator::new(&client, 100, 10);

    let mut fired = false;
    let outcome = mutator.apply(&[], Transition::Trash, |_| fired = true).await;

    assert_eq!(outcome.attempted, 0);
    assert!(!fired);
}
