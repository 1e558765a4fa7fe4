use tracing::{debug, warn};

use crate::client::GmailClient;
use crate::models::{MessageDetail, MessageRef};

/// Fetches display metadata for sampled messages
pub struct DetailFetcher<'a> {
    client: &'a dyn GmailClient,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(client: &'a dyn GmailClient) -> Self {
        Self { client }
    }

    /// Fetch one message's details; `None` means skip it
    pub async fn fetch(&self, message_ref: &MessageRef) -> Option<MessageDetail> {
        match self.client.get_detail(message_ref.id()).await {
            Ok(detail) => Some(detail),
            Err(e) if e.is_permission_denied() => {
                warn!(
                    "Permission denied reading message {} (check the granted scopes): {}",
                    message_ref, e
                );
                None
            }
            Err(e) => {
                warn!("Skipping message {}: {}", message_ref, e);
                None
            }
        }
    }

    /// Fetch details in order, skipping messages that fail
    pub async fn fetch_all(&self, refs: &[MessageRef]) -> Vec<MessageDetail> {
        let mut details = Vec::with_capacity(refs.len());
        for message_ref in refs {
            if let Some(detail) = self.fetch(message_ref).await {
                details.push(detail);
            }
        }
        debug!("Fetched {} of {} message details", details.len(), refs.len());
        details
    }
}
