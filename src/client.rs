//! Gmail API client

use async_trait::async_trait;
use google_gmail1::{api::Message, hyper_rustls, hyper_util, Gmail};
use tracing::debug;

use crate::error::{GmailError, Result};
use crate::models::{
    MessageDetail, MessageRef, Profile, SearchPage, NO_SUBJECT, UNKNOWN_DATE, UNKNOWN_SENDER,
};

/// Type alias for the Gmail hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// The authenticated user, as the Gmail API addresses it
const USER_ID: &str = "me";

/// Headers requested for metadata-only fetches
pub const DETAIL_HEADERS: &[&str] = &["Subject", "From", "Date"];

/// Operations consumed from the remote mail service
///
/// Every call is a single request; nothing here retries.
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Fetch one page of message ids matching `query` (empty matches everything)
    async fn search(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<SearchPage>;

    /// Metadata-only fetch of subject, sender, date and snippet
    async fn get_detail(&self, message_id: &str) -> Result<MessageDetail>;

    /// Move a message to trash
    async fn trash(&self, message_id: &str) -> Result<()>;

    /// Restore a message from trash
    async fn untrash(&self, message_id: &str) -> Result<()>;

    /// Mailbox profile of the authenticated user
    async fn get_profile(&self) -> Result<Profile>;
}

/// Build a Gmail hub that authorizes every request with `access_token`
///
/// Uses HTTP/1 for compatibility with google-gmail1.
pub fn build_hub(access_token: String) -> Result<GmailHub> {
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, access_token))
}

/// Gmail client backed by the google-gmail1 hub
///
/// Requests are issued one at a time by the callers; the client holds no
/// rate limiter and performs no retries.
pub struct ProductionGmailClient {
    hub: GmailHub,
    scope: String,
}

impl ProductionGmailClient {
    /// Create a client that tags each call with `scope`
    pub fn new(hub: GmailHub, scope: impl Into<String>) -> Self {
        Self {
            hub,
            scope: scope.into(),
        }
    }
}

/// Parse a metadata-format Gmail message into a MessageDetail
pub fn parse_message_detail(msg: Message) -> Result<MessageDetail> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let mut subject = None;
    let mut from = None;
    let mut date = None;

    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .map(|h| h.as_slice())
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            // First occurrence wins
            match name.to_lowercase().as_str() {
                "subject" if subject.is_none() => subject = Some(value.clone()),
                "from" if from.is_none() => from = Some(value.clone()),
                "date" if date.is_none() => date = Some(value.clone()),
                _ => {}
            }
        }
    }

    Ok(MessageDetail {
        id,
        subject: subject.unwrap_or_else(|| NO_SUBJECT.to_string()),
        from: from.unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        date: date.unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        snippet: msg.snippet.unwrap_or_default(),
    })
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn search(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<SearchPage> {
        let mut call = self
            .hub
            .users()
            .messages_list(USER_ID)
            .max_results(page_size);

        if !query.is_empty() {
            call = call.q(query);
        }
        if let Some(token) = page_token.as_ref() {
            call = call.page_token(token);
        }

        let (_, response) = call.add_scope(self.scope.as_str()).doit().await?;

        let refs: Vec<MessageRef> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .map(MessageRef::from)
            .collect();

        debug!(
            "messages.list returned {} ids (estimate {:?}, more: {})",
            refs.len(),
            response.result_size_estimate,
            response.next_page_token.is_some()
        );

        Ok(SearchPage {
            refs,
            result_size_estimate: response.result_size_estimate.map(u64::from).unwrap_or(0),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_detail(&self, message_id: &str) -> Result<MessageDetail> {
        let mut call = self
            .hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("metadata");
        for header in DETAIL_HEADERS {
            call = call.add_metadata_headers(header);
        }

        let (_, msg) = call.add_scope(self.scope.as_str()).doit().await?;
        parse_message_detail(msg)
    }

    async fn trash(&self, message_id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_trash(USER_ID, message_id)
            .add_scope(self.scope.as_str())
            .doit()
            .await?;
        Ok(())
    }

    async fn untrash(&self, message_id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_untrash(USER_ID, message_id)
            .add_scope(self.scope.as_str())
            .doit()
            .await?;
        Ok(())
    }

    async fn get_profile(&self) -> Result<Profile> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile(USER_ID)
            .add_scope(self.scope.as_str())
            .doit()
            .await?;

        Ok(Profile {
            email_address: profile.email_address.unwrap_or_default(),
            messages_total: profile.messages_total.unwrap_or(0).max(0) as u64,
            threads_total: profile.threads_total.unwrap_or(0).max(0) as u64,
        })
    }
}
