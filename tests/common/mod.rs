//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_cleaner::client::GmailClient;
use gmail_cleaner::error::{GmailError, Result};
use gmail_cleaner::models::{MessageDetail, MessageRef, Profile, SearchPage};
use mockall::mock;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;

/// Create a test message detail with default values
pub fn create_test_detail(id: &str, from: &str, subject: &str) -> MessageDetail {
    MessageDetail {
        id: id.to_string(),
        subject: subject.to_string(),
        from: from.to_string(),
        date: "Mon, 1 Jan 2024 10:00:00 -0800".to_string(),
        snippet: format!("Snippet of {}", subject),
    }
}

pub fn refs(ids: &[&str]) -> Vec<MessageRef> {
    ids.iter().map(|id| MessageRef::from(*id)).collect()
}

/// Ids `msg0`..`msg{n-1}`
pub fn numbered_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("msg{}", i)).collect()
}

/// Create mock Gmail API message response (JSON)
pub fn mock_gmail_message_response(id: &str, from: &str, subject: &str) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": "Email snippet...",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": subject},
                {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"}
            ]
        }
    })
}

/// Create mock Gmail list messages response (JSON)
pub fn mock_gmail_list_response(
    message_ids: Vec<&str>,
    result_size_estimate: u32,
    next_page_token: Option<&str>,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = message_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "threadId": format!("thread_{}", id)
            })
        })
        .collect();

    let mut response = json!({
        "messages": messages,
        "resultSizeEstimate": result_size_estimate
    });

    if let Some(token) = next_page_token {
        response["nextPageToken"] = json!(token);
    }

    response
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn search(
            &self,
            query: &str,
            page_size: u32,
            page_token: Option<String>,
        ) -> Result<SearchPage>;
        async fn get_detail(&self, message_id: &str) -> Result<MessageDetail>;
        async fn trash(&self, message_id: &str) -> Result<()>;
        async fn untrash(&self, message_id: &str) -> Result<()>;
        async fn get_profile(&self) -> Result<Profile>;
    }
}

/// In-memory mailbox that pages ids the way messages.list does
///
/// Page tokens are the offset of the next page.
#[derive(Default)]
pub struct FakeMailbox {
    ids: Vec<String>,
    /// Calls to trash/untrash/get_detail for these ids fail with 404
    missing: HashSet<String>,
    /// Calls to trash/untrash for these ids fail with 403
    forbidden: HashSet<String>,
    /// Every trash/untrash fails with 403
    forbid_all: bool,
    /// The search call with this zero-based index fails with 500
    fail_search_call: Option<usize>,
    pub search_calls: Mutex<Vec<(String, u32, Option<String>)>>,
    pub trashed: Mutex<Vec<String>>,
    pub untrashed: Mutex<Vec<String>>,
    pub detail_calls: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    pub fn with_missing(mut self, ids: &[&str]) -> Self {
        self.missing.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_forbidden(mut self, ids: &[&str]) -> Self {
        self.forbidden.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn forbid_all_mutations(mut self) -> Self {
        self.forbid_all = true;
        self
    }

    pub fn failing_search_call(mut self, index: usize) -> Self {
        self.fail_search_call = Some(index);
        self
    }

    pub fn search_call_count(&self) -> usize {
        self.search_calls.lock().unwrap().len()
    }

    pub fn trashed_ids(&self) -> Vec<String> {
        self.trashed.lock().unwrap().clone()
    }

    pub fn untrashed_ids(&self) -> Vec<String> {
        self.untrashed.lock().unwrap().clone()
    }

    fn check_mutation(&self, message_id: &str) -> Result<()> {
        if self.forbid_all || self.forbidden.contains(message_id) {
            return Err(GmailError::from_status(403));
        }
        if self.missing.contains(message_id) {
            return Err(GmailError::from_status(404));
        }
        Ok(())
    }
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn search(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<SearchPage> {
        let call_index = {
            let mut calls = self.search_calls.lock().unwrap();
            calls.push((query.to_string(), page_size, page_token.clone()));
            calls.len() - 1
        };
        if self.fail_search_call == Some(call_index) {
            return Err(GmailError::from_status(500));
        }

        let start: usize = page_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let end = (start + page_size as usize).min(self.ids.len());
        let next_page_token = (end < self.ids.len()).then(|| end.to_string());

        Ok(SearchPage {
            refs: self.ids[start..end]
                .iter()
                .map(|id| MessageRef::from(id.as_str()))
                .collect(),
            result_size_estimate: self.ids.len() as u64,
            next_page_token,
        })
    }

    async fn get_detail(&self, message_id: &str) -> Result<MessageDetail> {
        self.detail_calls.lock().unwrap().push(message_id.to_string());
        if self.missing.contains(message_id) {
            return Err(GmailError::from_status(404));
        }
        Ok(create_test_detail(
            message_id,
            "sender@example.com",
            &format!("Subject {}", message_id),
        ))
    }

    async fn trash(&self, message_id: &str) -> Result<()> {
        self.check_mutation(message_id)?;
        self.trashed.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn untrash(&self, message_id: &str) -> Result<()> {
        self.check_mutation(message_id)?;
        self.untrashed.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn get_profile(&self) -> Result<Profile> {
        Ok(Profile {
            email_address: "me@example.com".to_string(),
            messages_total: self.ids.len() as u64,
            threads_total: self.ids.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_gmail_list_response() {
        let response = mock_gmail_list_response(vec!["msg1", "msg2"], 10, Some("token123"));
        assert_eq!(response["messages"].as_array().unwrap().len(), 2);
        assert_eq!(response["nextPageToken"], "token123");
        assert_eq!(response["resultSizeEstimate"], 10);
    }

    #[tokio::test]
    async fn test_fake_mailbox_pages_by_offset() {
        let mailbox = FakeMailbox::new(numbered_ids(5));
        let page = mailbox.search("", 2, None).await.unwrap();
        assert_eq!(page.refs.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("2"));

        let last = mailbox.search("", 2, Some("4".to_string())).await.unwrap();
        assert_eq!(last.refs, refs(&["msg4"]));
        assert!(last.next_page_token.is_none());
    }
}
