//! Connection test and permission probe

mod common;

use chrono::{Duration, Utc};
use common::{create_test_detail, numbered_ids, FakeMailbox, MockGmailClient};
use gmail_cleaner::auth::{Credential, CredentialStore, FileCredentialStore};
use gmail_cleaner::config::GMAIL_MODIFY_SCOPE;
use gmail_cleaner::diagnostics::{
    check_permissions, check_stored_credential, print_credential_check, run_connection_test,
    run_filter_checks, CredentialCheck, ProbeResult, DIAGNOSTIC_FILTERS,
};
use gmail_cleaner::error::GmailError;
use gmail_cleaner::models::{MessageRef, SearchPage};
use tempfile::tempdir;

fn credential(scopes: &[&str]) -> Credential {
    Credential {
        access_token: "token".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: None,
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
    }
}

fn newest_page() -> SearchPage {
    SearchPage {
        refs: vec![MessageRef::from("newest")],
        result_size_estimate: 10,
        next_page_token: Some("more".to_string()),
    }
}

#[tokio::test]
async fn test_connection_test_reports_profile_and_sample() {
    let mailbox = FakeMailbox::new(numbered_ids(12));
    let mut output = Vec::new();

    let report = run_connection_test(&mailbox, &mut output).await.unwrap();

    assert!(report.is_ok());
    assert_eq!(report.profile.unwrap().email_address, "me@example.com");
    assert_eq!(report.estimated_total, Some(12));
    assert_eq!(report.sample.len(), 5);
    assert_eq!(report.sample_details.len(), 3);
    assert_eq!(mailbox.search_call_count(), 2);

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Connected as: me@example.com"));
    assert!(text.contains("Connection: OK"));
}

#[tokio::test]
async fn test_connection_test_keeps_going_after_profile_failure() {
    let mut client = MockGmailClient::new();
    client
        .expect_get_profile()
        .returning(|| Err(GmailError::from_status(401)));
    client.expect_search().times(2).returning(|_, _, _| {
        Ok(SearchPage {
            refs: Vec::new(),
            result_size_estimate: 0,
            next_page_token: None,
        })
    });

    let mut output = Vec::new();
    let report = run_connection_test(&client, &mut output).await.unwrap();

    assert!(!report.is_ok());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.estimated_total, Some(0));
    assert!(String::from_utf8(output).unwrap().contains("Connection: FAILED"));
}

#[tokio::test]
async fn test_permission_probe_trashes_then_restores_newest() {
    let mut client = MockGmailClient::new();
    let mut seq = mockall::Sequence::new();
    client
        .expect_search()
        .withf(|q, size, token| q.is_empty() && *size == 1 && token.is_none())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(newest_page()));
    client
        .expect_trash()
        .withf(|id| id == "newest")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    client
        .expect_untrash()
        .withf(|id| id == "newest")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let mut output = Vec::new();
    let report = check_permissions(
        &client,
        &credential(&[GMAIL_MODIFY_SCOPE]),
        GMAIL_MODIFY_SCOPE,
        &mut output,
    )
    .await
    .unwrap();

    assert!(report.scope_requested);
    assert_eq!(report.scope_granted, Some(true));
    assert_eq!(
        report.probe,
        ProbeResult::Granted {
            message_id: "newest".to_string()
        }
    );
}

#[tokio::test]
async fn test_permission_probe_denied_skips_untrash() {
    let mut client = MockGmailClient::new();
    client
        .expect_search()
        .returning(|_, _, _| Ok(newest_page()));
    client
        .expect_trash()
        .returning(|_| Err(GmailError::from_status(403)));
    client.expect_untrash().never();

    let mut output = Vec::new();
    let report = check_permissions(
        &client,
        &credential(&["https://www.googleapis.com/auth/gmail.readonly"]),
        GMAIL_MODIFY_SCOPE,
        &mut output,
    )
    .await
    .unwrap();

    assert!(!report.scope_requested);
    assert_eq!(report.scope_granted, Some(false));
    assert!(matches!(report.probe, ProbeResult::Denied { .. }));
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Required scope NOT requested"));
    assert!(text.contains("DENIED"));
}

#[tokio::test]
async fn test_requested_scope_unticked_at_consent_is_not_granted() {
    // Credential asked for gmail.modify but the service still refuses trash
    let mut client = MockGmailClient::new();
    client
        .expect_search()
        .returning(|_, _, _| Ok(newest_page()));
    client.expect_trash().returning(|_| {
        Err(GmailError::Forbidden(
            "Request had insufficient authentication scopes.".to_string(),
        ))
    });
    client.expect_untrash().never();

    let mut output = Vec::new();
    let report = check_permissions(
        &client,
        &credential(&[GMAIL_MODIFY_SCOPE]),
        GMAIL_MODIFY_SCOPE,
        &mut output,
    )
    .await
    .unwrap();

    assert!(report.scope_requested);
    assert_eq!(report.scope_granted, Some(false));
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Required scope requested"));
    assert!(text.contains("Scope NOT granted"));
    assert!(text.contains("left unticked on the consent screen"));
}

#[tokio::test]
async fn test_permission_probe_reports_message_left_in_trash() {
    let mut client = MockGmailClient::new();
    client
        .expect_search()
        .returning(|_, _, _| Ok(newest_page()));
    client.expect_trash().returning(|_| Ok(()));
    client
        .expect_untrash()
        .returning(|_| Err(GmailError::from_status(500)));

    let mut output = Vec::new();
    let report = check_permissions(
        &client,
        &credential(&[GMAIL_MODIFY_SCOPE]),
        GMAIL_MODIFY_SCOPE,
        &mut output,
    )
    .await
    .unwrap();

    assert!(matches!(
        report.probe,
        ProbeResult::RestoreFailed { ref message_id, .. } if message_id == "newest"
    ));
    assert!(String::from_utf8(output).unwrap().contains("Restore it manually"));
}

#[tokio::test]
async fn test_permission_probe_on_empty_mailbox() {
    let mailbox = FakeMailbox::new(Vec::new());
    let mut output = Vec::new();

    let report = check_permissions(
        &mailbox,
        &credential(&[GMAIL_MODIFY_SCOPE]),
        GMAIL_MODIFY_SCOPE,
        &mut output,
    )
    .await
    .unwrap();

    assert_eq!(report.probe, ProbeResult::NoMessages);
    assert_eq!(report.scope_granted, None);
    assert!(mailbox.trashed_ids().is_empty());
}

#[tokio::test]
async fn test_filter_checks_cover_every_filter_with_an_example() {
    let mailbox = FakeMailbox::new(numbered_ids(25));
    let mut output = Vec::new();

    let checks = run_filter_checks(&mailbox, &DIAGNOSTIC_FILTERS, &mut output)
        .await
        .unwrap();

    assert_eq!(checks.len(), DIAGNOSTIC_FILTERS.len());
    for check in &checks {
        assert_eq!(check.found, 10, "filter {:?}", check.filter);
        assert_eq!(check.estimated_total, 25);
        assert_eq!(check.example.as_ref().unwrap().id, "msg0");
        assert!(check.error.is_none());
    }
    // One bounded listing per filter
    assert_eq!(mailbox.search_call_count(), DIAGNOSTIC_FILTERS.len());

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("(no filter): 10 messages (estimated 25)"));
    assert!(text.contains("'before:2024/12/31': 10 messages"));
    assert!(text.contains("e.g. Subject msg0"));
}

#[tokio::test]
async fn test_failing_filter_does_not_stop_the_rest() {
    let mut client = MockGmailClient::new();
    client.expect_search().returning(|query, size, _| {
        assert_eq!(size, 10);
        if query == "is:unread" {
            Err(GmailError::BadRequest("Invalid query".to_string()))
        } else {
            Ok(SearchPage {
                refs: vec![MessageRef::from("m1")],
                result_size_estimate: 1,
                next_page_token: None,
            })
        }
    });
    client
        .expect_get_detail()
        .returning(|id| Ok(create_test_detail(id, "a@example.com", "Hello")));

    let mut output = Vec::new();
    let checks = run_filter_checks(&client, &["", "is:unread", "has:attachment"], &mut output)
        .await
        .unwrap();

    assert_eq!(checks.len(), 3);
    assert!(checks[1].error.as_ref().unwrap().contains("Invalid query"));
    assert_eq!(checks[1].found, 0);
    assert_eq!(checks[2].found, 1);
    assert_eq!(checks[2].example.as_ref().unwrap().subject, "Hello");
    assert!(String::from_utf8(output)
        .unwrap()
        .contains("'is:unread': FAILED"));
}

#[tokio::test]
async fn test_stored_credential_state_is_reported() {
    let dir = tempdir().unwrap();
    let store = FileCredentialStore::new(dir.path().join("token.json"));
    let now = Utc::now();

    assert_eq!(
        check_stored_credential(&store, now).await,
        CredentialCheck::Missing
    );

    let mut expired = credential(&[GMAIL_MODIFY_SCOPE]);
    expired.expires_at = Some(now - Duration::minutes(5));
    store.save(&expired).await.unwrap();

    let check = check_stored_credential(&store, now).await;
    assert_eq!(
        check,
        CredentialCheck::Loaded {
            valid: false,
            refreshable: true,
            requested_scopes: vec![GMAIL_MODIFY_SCOPE.to_string()],
        }
    );

    let mut output = Vec::new();
    print_credential_check(&check, &mut output).unwrap();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Valid: no"));
    assert!(text.contains("Expired: yes"));
    assert!(text.contains("Has refresh token: yes"));
    assert!(text.contains("Requested scopes"));
}
