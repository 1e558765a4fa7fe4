use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GmailError;

/// Identifier of a message returned by a search
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display metadata for a single message, fetched on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
}

pub const NO_SUBJECT: &str = "(no subject)";
pub const UNKNOWN_SENDER: &str = "(unknown sender)";
pub const UNKNOWN_DATE: &str = "(unknown date)";

/// One page of a message search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub refs: Vec<MessageRef>,
    pub result_size_estimate: u64,
    pub next_page_token: Option<String>,
}

/// Accumulated result of a search across one or more pages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub refs: Vec<MessageRef>,
    pub estimated_total: u64,
    pub pages_fetched: usize,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Mailbox profile as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email_address: String,
    pub messages_total: u64,
    pub threads_total: u64,
}

/// Why a single item of a batch failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// HTTP 403: the credential is missing a scope
    PermissionDenied,
    /// HTTP 404: the message no longer exists
    NotFound,
    Other(String),
}

impl From<&GmailError> for FailureReason {
    fn from(error: &GmailError) -> Self {
        match error {
            GmailError::Forbidden(_) => FailureReason::PermissionDenied,
            GmailError::MessageNotFound(_) => FailureReason::NotFound,
            other => FailureReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PermissionDenied => f.write_str("permission denied"),
            FailureReason::NotFound => f.write_str("not found"),
            FailureReason::Other(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub message_ref: MessageRef,
    pub reason: FailureReason,
}

/// Result of a best-effort, non-transactional batch mutation
///
/// Items that succeeded stay mutated even when later items fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.attempted == self.succeeded
    }

    pub fn permission_denied(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.reason == FailureReason::PermissionDenied)
            .count()
    }
}
