//! Connection and permission diagnostics
//!
//! None of these checks are fatal: each step reports its own failure and the
//! next step still runs.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::auth::{Credential, CredentialStore};
use crate::client::GmailClient;
use crate::config::AuthConfig;
use crate::details::DetailFetcher;
use crate::error::{GmailError, Result};
use crate::models::{MessageDetail, MessageRef, Profile};
use crate::search::{QueryExecutor, SearchMode, SearchQuery};

const SAMPLE_SIZE: u32 = 5;
const SAMPLE_DETAILS: usize = 3;
const FILTER_CHECK_LIMIT: u32 = 10;

/// Fields an installed-app client secret must carry
const SECRET_FIELDS: [&str; 4] = ["client_id", "client_secret", "auth_uri", "token_uri"];

/// Filters exercised by the connection test, from no filter to date ranges
pub const DIAGNOSTIC_FILTERS: [&str; 9] = [
    "",
    "is:unread",
    "is:read",
    "has:attachment",
    "gmail",
    "from:gmail.com",
    "subject:test",
    "after:2024/01/01",
    "before:2024/12/31",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub description: &'static str,
    pub path: PathBuf,
    /// File size in bytes, `None` when the file does not exist
    pub size: Option<u64>,
}

fn check_file(description: &'static str, path: &Path) -> FileCheck {
    FileCheck {
        description,
        path: path.to_path_buf(),
        size: std::fs::metadata(path).ok().map(|m| m.len()),
    }
}

/// Report whether the client secret and stored credential exist
pub fn check_files(config: &AuthConfig) -> Vec<FileCheck> {
    vec![
        check_file("OAuth client secret", &config.credentials_path),
        check_file("Stored credential", &config.token_path),
    ]
}

pub fn print_file_checks<W: Write + ?Sized>(checks: &[FileCheck], output: &mut W) -> Result<()> {
    writeln!(output, "Checking required files...")?;
    for check in checks {
        match check.size {
            Some(size) => writeln!(
                output,
                "  OK      {} - {} ({} bytes)",
                check.path.display(),
                check.description,
                size
            )?,
            None => writeln!(
                output,
                "  MISSING {} - {}",
                check.path.display(),
                check.description
            )?,
        }
    }
    Ok(())
}

/// Outcome of validating the OAuth client-secret descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretCheck {
    Valid { client_id: String },
    Missing,
    Invalid { reason: String },
}

/// Validate the client secret before any OAuth traffic
///
/// The file must hold an `installed` section with every entry of
/// [`SECRET_FIELDS`], and yup-oauth2 must accept it.
pub async fn check_client_secret(path: &Path) -> SecretCheck {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SecretCheck::Missing,
        Err(e) => {
            return SecretCheck::Invalid {
                reason: format!("unreadable: {}", e),
            }
        }
    };

    let json: Value = match serde_json::from_str(&content) {
        Ok(json) => json,
        Err(e) => {
            return SecretCheck::Invalid {
                reason: format!("not valid JSON: {}", e),
            }
        }
    };

    let Some(installed) = json.get("installed") else {
        return SecretCheck::Invalid {
            reason: "no 'installed' section (download a Desktop app OAuth client)".to_string(),
        };
    };

    if let Some(field) = SECRET_FIELDS
        .iter()
        .find(|field| installed.get(**field).and_then(Value::as_str).is_none())
    {
        return SecretCheck::Invalid {
            reason: format!("missing field '{}'", field),
        };
    }

    match yup_oauth2::read_application_secret(path).await {
        Ok(secret) => SecretCheck::Valid {
            client_id: secret.client_id,
        },
        Err(e) => SecretCheck::Invalid {
            reason: e.to_string(),
        },
    }
}

pub fn print_secret_check<W: Write + ?Sized>(check: &SecretCheck, output: &mut W) -> Result<()> {
    writeln!(output, "\nChecking OAuth client secret...")?;
    match check {
        SecretCheck::Valid { client_id } => {
            writeln!(output, "  client_id: {}", preview(client_id, 20))?;
            writeln!(output, "  Client secret looks valid")?;
        }
        SecretCheck::Missing => writeln!(output, "  Client secret file not found")?,
        SecretCheck::Invalid { reason } => writeln!(output, "  Client secret INVALID: {}", reason)?,
    }
    Ok(())
}

fn preview(value: &str, chars: usize) -> String {
    if value.chars().count() > chars {
        format!("{}...", value.chars().take(chars).collect::<String>())
    } else {
        value.to_string()
    }
}

/// State of the stored credential as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Missing,
    Loaded {
        valid: bool,
        refreshable: bool,
        requested_scopes: Vec<String>,
    },
    Unreadable { reason: String },
}

/// Inspect the stored credential without refreshing or replacing it
pub async fn check_stored_credential(
    store: &dyn CredentialStore,
    now: DateTime<Utc>,
) -> CredentialCheck {
    match store.load().await {
        Ok(None) => CredentialCheck::Missing,
        Ok(Some(credential)) => CredentialCheck::Loaded {
            valid: credential.is_valid(now),
            refreshable: credential.can_refresh(),
            requested_scopes: credential.scopes,
        },
        Err(e) => CredentialCheck::Unreadable {
            reason: e.to_string(),
        },
    }
}

pub fn print_credential_check<W: Write + ?Sized>(
    check: &CredentialCheck,
    output: &mut W,
) -> Result<()> {
    writeln!(output, "\nChecking stored credential...")?;
    match check {
        CredentialCheck::Missing => {
            writeln!(output, "  No stored credential; authorization will run")?
        }
        CredentialCheck::Loaded {
            valid,
            refreshable,
            requested_scopes,
        } => {
            writeln!(output, "  Valid: {}", yes_no(*valid))?;
            writeln!(output, "  Expired: {}", yes_no(!*valid))?;
            writeln!(output, "  Has refresh token: {}", yes_no(*refreshable))?;
            writeln!(output, "  Requested scopes: {:?}", requested_scopes)?;
        }
        CredentialCheck::Unreadable { reason } => {
            writeln!(output, "  Could not load stored credential: {}", reason)?
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionReport {
    pub profile: Option<Profile>,
    pub estimated_total: Option<u64>,
    pub sample: Vec<MessageRef>,
    pub sample_details: Vec<MessageDetail>,
    pub errors: Vec<String>,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Profile fetch, mailbox estimate, and a small sample listing
pub async fn run_connection_test<W: Write + ?Sized>(
    client: &dyn GmailClient,
    output: &mut W,
) -> Result<ConnectionReport> {
    let mut report = ConnectionReport::default();
    let executor = QueryExecutor::new(client, SAMPLE_SIZE);
    let all = SearchQuery::match_all();

    writeln!(output, "\nTesting connection to Gmail...")?;
    match client.get_profile().await {
        Ok(profile) => {
            writeln!(output, "  Connected as: {}", profile.email_address)?;
            writeln!(output, "  Total messages: {}", profile.messages_total)?;
            writeln!(output, "  Total threads: {}", profile.threads_total)?;
            report.profile = Some(profile);
        }
        Err(e) => {
            writeln!(output, "  Profile fetch failed: {}", e)?;
            report.errors.push(format!("profile: {}", e));
        }
    }

    match executor
        .search(&all, SearchMode::Bounded { max_results: 1 })
        .await
    {
        Ok(result) => {
            writeln!(
                output,
                "  Connection OK! Estimated messages: {}",
                result.estimated_total
            )?;
            report.estimated_total = Some(result.estimated_total);
        }
        Err(e) => {
            writeln!(output, "  Listing failed: {}", e)?;
            report.errors.push(format!("list: {}", e));
        }
    }

    match executor
        .search(
            &all,
            SearchMode::Bounded {
                max_results: SAMPLE_SIZE,
            },
        )
        .await
    {
        Ok(result) => {
            writeln!(output, "  Messages found without filter: {}", result.len())?;
            report.sample = result.refs;
        }
        Err(e) => {
            writeln!(output, "  Sample listing failed: {}", e)?;
            report.errors.push(format!("sample: {}", e));
        }
    }

    if !report.sample.is_empty() {
        writeln!(output, "\nSample of available messages:")?;
        let fetcher = DetailFetcher::new(client);
        let take = report.sample.len().min(SAMPLE_DETAILS);
        report.sample_details = fetcher.fetch_all(&report.sample[..take]).await;
        for (i, detail) in report.sample_details.iter().enumerate() {
            writeln!(output, "  {}. {} - {}", i + 1, detail.subject, detail.from)?;
        }
    }

    writeln!(output, "\nStatistics:")?;
    if let Some(profile) = &report.profile {
        writeln!(output, "  - Messages in mailbox: {}", profile.messages_total)?;
    }
    writeln!(
        output,
        "  - Connection: {}",
        if report.is_ok() { "OK" } else { "FAILED" }
    )?;

    info!(
        "Connection test finished with {} errors",
        report.errors.len()
    );
    Ok(report)
}

/// Result of running one search filter during the connection test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCheck {
    pub filter: String,
    pub found: usize,
    pub estimated_total: u64,
    pub example: Option<MessageDetail>,
    pub error: Option<String>,
}

/// Run each filter with a small bound and show one matching message
///
/// A failing filter is recorded and the remaining filters still run.
pub async fn run_filter_checks<W: Write + ?Sized>(
    client: &dyn GmailClient,
    filters: &[&str],
    output: &mut W,
) -> Result<Vec<FilterCheck>> {
    let executor = QueryExecutor::new(client, FILTER_CHECK_LIMIT);
    let fetcher = DetailFetcher::new(client);
    let mut checks = Vec::with_capacity(filters.len());

    writeln!(output, "\nTesting search filters...")?;
    for filter in filters {
        let label = if filter.is_empty() {
            "(no filter)".to_string()
        } else {
            format!("'{}'", filter)
        };

        let mut check = FilterCheck {
            filter: filter.to_string(),
            found: 0,
            estimated_total: 0,
            example: None,
            error: None,
        };

        match executor
            .search(
                &SearchQuery::new(filter),
                SearchMode::Bounded {
                    max_results: FILTER_CHECK_LIMIT,
                },
            )
            .await
        {
            Ok(result) => {
                check.found = result.len();
                check.estimated_total = result.estimated_total;
                writeln!(
                    output,
                    "  {}: {} messages (estimated {})",
                    label, check.found, check.estimated_total
                )?;
                if let Some(first) = result.refs.first() {
                    check.example = fetcher.fetch(first).await;
                    if let Some(example) = &check.example {
                        writeln!(
                            output,
                            "      e.g. {} - {}",
                            preview(&example.subject, 50),
                            example.from
                        )?;
                    }
                }
            }
            Err(e) => {
                writeln!(output, "  {}: FAILED ({})", label, e)?;
                check.error = Some(e.to_string());
            }
        }

        debug!("Filter {} matched {} messages", label, check.found);
        checks.push(check);
    }

    Ok(checks)
}

/// Outcome of trashing and restoring a probe message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Trash and untrash both succeeded
    Granted { message_id: String },
    /// The service answered 403
    Denied { reason: String },
    /// The mailbox had nothing to probe with
    NoMessages,
    Failed { reason: String },
    /// The probe message was trashed but could not be restored
    RestoreFailed { message_id: String, reason: String },
}

impl ProbeResult {
    /// Whether the service accepted the trash call, `None` when it was never
    /// attempted or failed for an unrelated reason
    pub fn trash_allowed(&self) -> Option<bool> {
        match self {
            ProbeResult::Granted { .. } | ProbeResult::RestoreFailed { .. } => Some(true),
            ProbeResult::Denied { .. } => Some(false),
            ProbeResult::NoMessages | ProbeResult::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionReport {
    /// The scope was asked for at consent time
    pub scope_requested: bool,
    /// What the service actually allowed, learned from the trash call
    pub scope_granted: Option<bool>,
    pub probe: ProbeResult,
}

/// Check the requested scopes, then trash and restore the newest message
///
/// The stored credential only records what was requested. Whether the user
/// actually granted the scope is decided by the trash call.
pub async fn check_permissions<W: Write + ?Sized>(
    client: &dyn GmailClient,
    credential: &Credential,
    required_scope: &str,
    output: &mut W,
) -> Result<PermissionReport> {
    writeln!(output, "\nChecking current permissions...")?;
    let scope_requested = credential.scopes.iter().any(|s| s == required_scope);
    writeln!(output, "  Requested scopes: {:?}", credential.scopes)?;
    if scope_requested {
        writeln!(output, "  Required scope requested: {}", required_scope)?;
    } else {
        writeln!(output, "  Required scope NOT requested: {}", required_scope)?;
        writeln!(output, "  Run with --reauth and grant every requested permission.")?;
    }

    writeln!(output, "\nTesting permission to move messages to trash...")?;
    let probe = probe_trash(client, output).await?;
    let scope_granted = probe.trash_allowed();

    match scope_granted {
        Some(true) => writeln!(output, "\nScope granted: {}", required_scope)?,
        Some(false) => {
            writeln!(output, "\nScope NOT granted: {}", required_scope)?;
            if scope_requested {
                writeln!(
                    output,
                    "  It was requested but left unticked on the consent screen. \
                     Run with --reauth and tick every permission."
                )?;
            }
        }
        None => writeln!(output, "\nScope grant unknown: {}", required_scope)?,
    }

    Ok(PermissionReport {
        scope_requested,
        scope_granted,
        probe,
    })
}

async fn probe_trash<W: Write + ?Sized>(
    client: &dyn GmailClient,
    output: &mut W,
) -> Result<ProbeResult> {
    let executor = QueryExecutor::new(client, 1);
    let newest = match executor
        .search(&SearchQuery::match_all(), SearchMode::Bounded { max_results: 1 })
        .await
    {
        Ok(result) => result.refs.into_iter().next(),
        Err(e) => {
            writeln!(output, "  Could not list messages: {}", e)?;
            return Ok(ProbeResult::Failed {
                reason: e.to_string(),
            });
        }
    };

    let Some(message_ref) = newest else {
        writeln!(output, "  No messages found to test with.")?;
        return Ok(ProbeResult::NoMessages);
    };

    writeln!(output, "  Testing with message ID: {}", message_ref)?;
    if let Err(e) = client.trash(message_ref.id()).await {
        return match e {
            GmailError::Forbidden(reason) => {
                writeln!(output, "  Permission to trash: DENIED ({})", reason)?;
                Ok(ProbeResult::Denied { reason })
            }
            other => {
                writeln!(output, "  Unexpected error: {}", other)?;
                Ok(ProbeResult::Failed {
                    reason: other.to_string(),
                })
            }
        };
    }
    writeln!(output, "  Permission to trash: OK")?;

    match client.untrash(message_ref.id()).await {
        Ok(()) => {
            writeln!(output, "  Message restored, probe complete.")?;
            Ok(ProbeResult::Granted {
                message_id: message_ref.id().to_string(),
            })
        }
        Err(e) => {
            warn!("Probe message {} left in trash: {}", message_ref, e);
            writeln!(
                output,
                "  Could not restore message {} from trash: {}. Restore it manually.",
                message_ref, e
            )?;
            Ok(ProbeResult::RestoreFailed {
                message_id: message_ref.id().to_string(),
                reason: e.to_string(),
            })
        }
    }
}
