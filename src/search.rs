//! Paginated message search

use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::Result;
use crate::models::{MessageRef, SearchResult};

/// A Gmail search filter
///
/// Surrounding whitespace is trimmed; an empty filter matches every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_match_all() {
            f.write_str("(all messages)")
        } else {
            write!(f, "'{}'", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// A single page capped at `max_results`
    Bounded { max_results: u32 },
    /// Every page until the service stops returning a continuation token
    Exhaustive,
}

/// Runs searches against the mail service
pub struct QueryExecutor<'a> {
    client: &'a dyn GmailClient,
    page_size: u32,
}

impl<'a> QueryExecutor<'a> {
    /// `page_size` is used for exhaustive searches only
    pub fn new(client: &'a dyn GmailClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    /// Search for every message matching `query`
    ///
    /// Any error aborts the whole search; pages fetched before it are dropped.
    pub async fn search(&self, query: &SearchQuery, mode: SearchMode) -> Result<SearchResult> {
        if query.is_match_all() {
            info!("Empty filter, searching all messages");
        }

        match mode {
            SearchMode::Bounded { max_results } => self.search_bounded(query, max_results).await,
            SearchMode::Exhaustive => self.search_exhaustive(query).await,
        }
    }

    async fn search_bounded(&self, query: &SearchQuery, max_results: u32) -> Result<SearchResult> {
        debug!("Sample search for {} (max {})", query, max_results);

        let page = self
            .client
            .search(query.as_str(), max_results, None)
            .await
            .map_err(|e| {
                warn!("Search for {} failed: {}", query, e);
                e
            })?;

        let mut refs = page.refs;
        // The service may ignore the cap; never hand back more than asked for
        refs.truncate(max_results as usize);

        Ok(SearchResult {
            estimated_total: page.result_size_estimate.max(refs.len() as u64),
            refs,
            pages_fetched: 1,
        })
    }

    async fn search_exhaustive(&self, query: &SearchQuery) -> Result<SearchResult> {
        let mut all_refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages_fetched = 0;

        // The final page carries the most accurate estimate
        let last_estimate = loop {
            let page = self
                .client
                .search(query.as_str(), self.page_size, page_token.take())
                .await
                .map_err(|e| {
                    warn!(
                        "Search for {} failed after {} pages ({} ids discarded): {}",
                        query,
                        pages_fetched,
                        all_refs.len(),
                        e
                    );
                    e
                })?;

            pages_fetched += 1;
            all_refs.extend(page.refs);

            info!(
                "Page {}: {} messages so far",
                pages_fetched,
                all_refs.len()
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break page.result_size_estimate,
            }
        };

        info!(
            "Search complete: {} messages across {} pages (estimate {})",
            all_refs.len(),
            pages_fetched,
            last_estimate
        );

        Ok(SearchResult {
            estimated_total: last_estimate.max(all_refs.len() as u64),
            refs: all_refs,
            pages_fetched,
        })
    }
}
