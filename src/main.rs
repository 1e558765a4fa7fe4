use anyhow::Result;
use clap::Parser;
use gmail_cleaner::auth::{self, FileCredentialStore};
use gmail_cleaner::cli::{Cli, ProgressReporter, RunMode};
use gmail_cleaner::client::{self, ProductionGmailClient};
use gmail_cleaner::config::{Config, GMAIL_MODIFY_SCOPE};
use gmail_cleaner::diagnostics::{self, DIAGNOSTIC_FILTERS};
use gmail_cleaner::error::GmailError;
use gmail_cleaner::search::SearchQuery;
use gmail_cleaner::workflow::{Driver, RunOptions, RunState};
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing::Instrument;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn poisoned<T>(_: T) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "log buffer lock poisoned")
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().map_err(poisoned)?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().map_err(poisoned)?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        let _ = write_error(&e, &mut std::io::stderr());
        eprintln!("\nFor help, run: gmail-cleaner --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Dependencies pull in different rustls crypto providers; pin one
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_cleaner=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_cleaner=info,warn"))
    };

    // Logs print above progress bars
    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);
    execute(cli, (*multi_progress).clone(), run_id)
        .instrument(span)
        .await
}

async fn execute(cli: Cli, multi_progress: MultiProgress, run_id: Uuid) -> Result<()> {
    let config = Config::load(&cli.config)
        .await?
        .with_overrides(cli.credentials.clone(), cli.token_cache.clone());
    config.validate()?;

    let mode = cli.mode();
    let reporter = ProgressReporter::with_multi_progress(multi_progress);
    let mut stdout = std::io::stdout();

    if mode == RunMode::ConnectionTest {
        let checks = diagnostics::check_files(&config.auth);
        diagnostics::print_file_checks(&checks, &mut stdout)?;

        let secret = diagnostics::check_client_secret(&config.auth.credentials_path).await;
        diagnostics::print_secret_check(&secret, &mut stdout)?;

        let store = FileCredentialStore::new(&config.auth.token_path);
        let stored = diagnostics::check_stored_credential(&store, chrono::Utc::now()).await;
        diagnostics::print_credential_check(&stored, &mut stdout)?;
    }

    // No spinner here: the consent flow prints a URL that must stay readable
    tracing::info!("Authenticating with Gmail API...");
    let authenticator = auth::authenticator_from_config(&config.auth);
    let outcome = if cli.reauth {
        authenticator.force_reauth().await?
    } else {
        authenticator.authenticate().await?
    };
    tracing::debug!("Authentication states: {:?}", outcome.states);

    let hub = client::build_hub(outcome.credential.access_token.clone())?;
    let scope = config
        .auth
        .scopes
        .first()
        .cloned()
        .unwrap_or_else(|| GMAIL_MODIFY_SCOPE.to_string());
    let gmail = ProductionGmailClient::new(hub, scope);

    match mode {
        RunMode::ConnectionTest => {
            let report = diagnostics::run_connection_test(&gmail, &mut stdout).await?;
            let filters =
                diagnostics::run_filter_checks(&gmail, &DIAGNOSTIC_FILTERS, &mut stdout).await?;
            let failed_filters = filters.iter().filter(|f| f.error.is_some()).count();
            if failed_filters > 0 {
                tracing::warn!("{} of {} filters failed", failed_filters, filters.len());
            }
            if report.is_ok() {
                println!("\nConnection test passed.");
            } else {
                println!("\nConnection test finished with errors:");
                for error in &report.errors {
                    println!("  - {}", error);
                }
            }
        }
        RunMode::CheckPermissions => {
            let report = diagnostics::check_permissions(
                &gmail,
                &outcome.credential,
                GMAIL_MODIFY_SCOPE,
                &mut stdout,
            )
            .await?;
            tracing::info!(
                scope_requested = report.scope_requested,
                scope_granted = ?report.scope_granted,
                "Permission check finished: {:?}",
                report.probe
            );
        }
        RunMode::Display | RunMode::Mutate(_) => {
            let action = match mode {
                RunMode::Mutate(transition) => Some(transition),
                _ => None,
            };
            let options = RunOptions {
                query: SearchQuery::new(&cli.filter),
                max_results: cli
                    .max_results
                    .unwrap_or(config.search.default_max_results),
                action,
            };

            let stdin = std::io::stdin().lock();
            let mut driver = Driver::new(&gmail, &config, stdin, stdout)
                .with_reporter(reporter)
                .with_run_id(run_id.to_string());
            let report = driver.run(&options).await?;

            tracing::info!("Run finished in state {:?}", report.final_state());
            if report.final_state() == RunState::Done {
                if let Some(outcome) = &report.outcome {
                    if !outcome.is_complete_success() {
                        tracing::warn!("{} messages were not processed", outcome.failed());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Write an error with its cause chain and an operator hint
///
/// Setup and authentication failures stop the run before any search, so
/// they also say that the mailbox was left untouched.
fn write_error<W: Write>(error: &anyhow::Error, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Error: {}", error)?;

    let mut cause = error.source();
    while let Some(e) = cause {
        writeln!(out, "  Caused by: {}", e)?;
        cause = e.source();
    }

    if let Some(gmail_err) = error.downcast_ref::<GmailError>() {
        if gmail_err.is_fatal() {
            writeln!(out, "\nSetup problem: no messages were searched or changed.")?;
        }
        if let Some(hint) = gmail_err.hint() {
            writeln!(out, "\nHint: {}", hint)?;
        }
    }
    Ok(())
}
