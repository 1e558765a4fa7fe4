//! Gmail Cleaner
//!
//! Finds messages with a Gmail search filter, shows a sample for review and,
//! after an explicit confirmation, moves every match to trash.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a stored, refreshable credential
//! - **Search**: bounded samples and exhaustive paginated collection of message ids
//! - **Review**: metadata-only detail fetches for the sample
//! - **Mutation**: best-effort batch trash/restore with per-item outcomes
//! - **Diagnostics**: connection test and a trash/restore permission probe
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_cleaner::{auth, client, config::Config, search::*};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("gmail-cleaner.toml".as_ref()).await?;
//!
//!     let outcome = auth::authenticator_from_config(&config.auth)
//!         .authenticate()
//!         .await?;
//!     let hub = client::build_hub(outcome.credential.access_token.clone())?;
//!     let gmail = client::ProductionGmailClient::new(hub, config.auth.scopes[0].clone());
//!
//!     let result = QueryExecutor::new(&gmail, config.search.page_size)
//!         .search(&SearchQuery::new("older_than:1y"), SearchMode::Exhaustive)
//!         .await?;
//!     println!("{} messages match", result.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Credential lifecycle and OAuth2 flows
//! - [`client`] - Gmail API client trait and production implementation
//! - [`cli`] - Command-line arguments and progress display
//! - [`config`] - Configuration management
//! - [`confirm`] - Typed confirmation gate
//! - [`details`] - Message metadata fetching
//! - [`diagnostics`] - Connection test and permission probe
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures
//! - [`mutator`] - Batch trash/restore
//! - [`search`] - Query execution and pagination
//! - [`workflow`] - The search, review, confirm, mutate run

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod confirm;
pub mod details;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod mutator;
pub mod search;
pub mod workflow;

pub use error::{GmailError, Result};

pub use models::{
    BatchOutcome, FailureReason, ItemFailure, MessageDetail, MessageRef, Profile, SearchPage,
    SearchResult,
};

pub use auth::{AuthOutcome, AuthState, Authenticator, Credential, CredentialStore, OAuthFlow};
pub use client::{GmailClient, ProductionGmailClient};
pub use config::Config;
pub use mutator::{BatchMutator, BatchProgress, Transition};
pub use search::{QueryExecutor, SearchMode, SearchQuery};
pub use workflow::{AbortReason, Driver, RunOptions, RunReport, RunState};

pub use cli::{Cli, ProgressReporter, RunMode};
