//! The search → review → confirm → mutate run
//!
//! [`Driver`] sequences the query executor, detail fetcher, confirmation
//! gate and batch mutator, and records every state it passes through.

use std::io::{BufRead, Write};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::{truncate_string, ProgressReporter};
use crate::client::GmailClient;
use crate::config::Config;
use crate::confirm;
use crate::details::DetailFetcher;
use crate::error::Result;
use crate::models::{BatchOutcome, MessageDetail, SearchResult};
use crate::mutator::{BatchMutator, Transition};
use crate::search::{QueryExecutor, SearchMode, SearchQuery};

const SNIPPET_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    SearchFailed,
    NoResults,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Authenticated,
    SampleSearched,
    SampleDisplayed,
    FullSearched,
    Confirmed,
    Mutated,
    Done,
    Aborted(AbortReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted(_))
    }
}

/// What the run should do once the sample has been shown
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: SearchQuery,
    pub max_results: u32,
    /// `None` for a display-only run
    pub action: Option<Transition>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub states: Vec<RunState>,
    pub sample: Vec<MessageDetail>,
    pub sample_count: usize,
    pub estimated_total: u64,
    pub full_count: Option<usize>,
    pub outcome: Option<BatchOutcome>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn final_state(&self) -> RunState {
        self.states
            .last()
            .copied()
            .unwrap_or(RunState::Authenticated)
    }
}

/// Drives a single run against an authenticated client
pub struct Driver<'a, R, W> {
    client: &'a dyn GmailClient,
    config: &'a Config,
    input: R,
    output: W,
    reporter: ProgressReporter,
    run_id: String,
}

impl<'a, R: BufRead, W: Write> Driver<'a, R, W> {
    pub fn new(client: &'a dyn GmailClient, config: &'a Config, input: R, output: W) -> Self {
        Self {
            client,
            config,
            input,
            output,
            reporter: ProgressReporter::hidden(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Use an id generated by the caller, e.g. one already on a tracing span
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub async fn run(&mut self, options: &RunOptions) -> Result<RunReport> {
        let mut report = RunReport {
            run_id: self.run_id.clone(),
            states: vec![RunState::Authenticated],
            sample: Vec::new(),
            sample_count: 0,
            estimated_total: 0,
            full_count: None,
            outcome: None,
            error: None,
        };

        let client = self.client;
        let executor = QueryExecutor::new(client, self.config.search.page_size);

        writeln!(
            self.output,
            "\nSearching a sample of up to {} messages matching {}",
            options.max_results, options.query
        )?;
        let spinner = self.reporter.add_spinner("Searching sample...");
        let sample = executor
            .search(
                &options.query,
                SearchMode::Bounded {
                    max_results: options.max_results,
                },
            )
            .await;
        self.reporter.finish_spinner(&spinner);

        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => return self.abort_search_failed(report, e.to_string()),
        };
        if sample.is_empty() {
            self.print_no_results_tips()?;
            return Ok(transition(report, RunState::Aborted(AbortReason::NoResults)));
        }

        report.sample_count = sample.len();
        report.estimated_total = sample.estimated_total;
        report = transition(report, RunState::SampleSearched);
        self.print_sample_summary(&sample)?;

        let spinner = self.reporter.add_spinner("Fetching message details...");
        report.sample = DetailFetcher::new(client).fetch_all(&sample.refs).await;
        self.reporter.finish_spinner(&spinner);

        self.display_messages(&report.sample)?;
        report = transition(report, RunState::SampleDisplayed);

        let Some(action) = options.action else {
            self.print_next_step_hint(&options.query, sample.len(), options.max_results)?;
            return Ok(transition(report, RunState::Done));
        };

        writeln!(
            self.output,
            "\nSearching ALL messages matching {} to {}...",
            options.query,
            action.verb()
        )?;
        let spinner = self.reporter.add_spinner("Searching all matching messages...");
        let full = executor.search(&options.query, SearchMode::Exhaustive).await;
        self.reporter.finish_spinner(&spinner);

        let full = match full {
            Ok(full) => full,
            Err(e) => return self.abort_search_failed(report, e.to_string()),
        };
        if full.is_empty() {
            writeln!(self.output, "No messages found to {}.", action.verb())?;
            return Ok(transition(report, RunState::Aborted(AbortReason::NoResults)));
        }

        report.full_count = Some(full.len());
        report = transition(report, RunState::FullSearched);
        writeln!(
            self.output,
            "Found {} messages across {} pages.",
            full.len(),
            full.pages_fetched
        )?;

        writeln!(
            self.output,
            "\nWARNING: you are about to {} {} messages! (sample shown above: {} messages)",
            action.verb(),
            full.len(),
            report.sample.len()
        )?;
        let token = self.config.trash.confirmation_token.clone();
        let confirmed = confirm::confirm(&mut self.input, &mut self.output, "Are you sure?", &token)?;
        if !confirmed {
            info!("Confirmation declined, nothing was changed");
            writeln!(self.output, "Operation cancelled.")?;
            return Ok(transition(report, RunState::Aborted(AbortReason::Declined)));
        }
        report = transition(report, RunState::Confirmed);

        let mutator = BatchMutator::new(
            client,
            self.config.trash.batch_size,
            self.config.trash.progress_interval,
        );
        let pb = self
            .reporter
            .add_progress_bar(full.len() as u64, &format!("Applying {}...", action.verb()));
        let outcome = mutator
            .apply(&full.refs, action, |progress| {
                pb.set_position(progress.processed as u64);
                pb.set_message(format!(
                    "{:.1}% ({} ok, batch {}/{})",
                    progress.percent(),
                    progress.succeeded,
                    progress.batch,
                    progress.batches
                ));
            })
            .await;
        pb.finish_and_clear();

        self.print_outcome(&outcome, action)?;
        report.outcome = Some(outcome);
        report = transition(report, RunState::Mutated);

        Ok(transition(report, RunState::Done))
    }

    fn abort_search_failed(&mut self, report: RunReport, error: String) -> Result<RunReport> {
        warn!("Search failed: {}", error);
        writeln!(self.output, "Error while searching messages: {}", error)?;
        let mut report = transition(report, RunState::Aborted(AbortReason::SearchFailed));
        report.error = Some(error);
        Ok(report)
    }

    fn print_sample_summary(&mut self, sample: &SearchResult) -> Result<()> {
        writeln!(self.output, "Sample search result:")?;
        writeln!(self.output, "  - Messages returned: {}", sample.len())?;
        writeln!(self.output, "  - Estimated total: {}", sample.estimated_total)?;
        if sample.estimated_total > sample.len() as u64 {
            writeln!(
                self.output,
                "  More messages are available beyond this sample."
            )?;
        }
        Ok(())
    }

    fn print_no_results_tips(&mut self) -> Result<()> {
        writeln!(self.output, "No messages found. Possible causes:")?;
        writeln!(self.output, "  - The filter is too specific")?;
        writeln!(self.output, "  - No messages match the criteria")?;
        writeln!(self.output, "  - The filter syntax is wrong")?;
        writeln!(self.output, "\nFilters to try:")?;
        writeln!(self.output, "  ''                 (empty - all messages)")?;
        writeln!(self.output, "  'is:unread'        (unread)")?;
        writeln!(self.output, "  'has:attachment'   (with attachments)")?;
        writeln!(self.output, "  'after:2024/01/01' (after a date)")?;
        writeln!(self.output, "Run with --test to verify the connection.")?;
        Ok(())
    }

    fn display_messages(&mut self, messages: &[MessageDetail]) -> Result<()> {
        if messages.is_empty() {
            writeln!(self.output, "No message details could be fetched.")?;
            return Ok(());
        }

        let rule = "=".repeat(80);
        let thin = "-".repeat(80);
        writeln!(self.output, "\nFound {} messages:", messages.len())?;
        writeln!(self.output, "{}", rule)?;

        for (i, msg) in messages.iter().enumerate() {
            writeln!(self.output, "\n{:2}. ID: {}", i + 1, msg.id)?;
            writeln!(self.output, "    From: {}", msg.from)?;
            writeln!(self.output, "    Subject: {}", msg.subject)?;
            writeln!(self.output, "    Date: {}", msg.date)?;
            writeln!(
                self.output,
                "    Preview: {}",
                truncate_string(&msg.snippet, SNIPPET_PREVIEW_CHARS)
            )?;
            writeln!(self.output, "{}", thin)?;
        }
        Ok(())
    }

    fn print_next_step_hint(
        &mut self,
        query: &SearchQuery,
        sample_len: usize,
        max_results: u32,
    ) -> Result<()> {
        if sample_len < max_results as usize {
            writeln!(
                self.output,
                "\nTo move these messages to trash, run again with --delete:"
            )?;
        } else {
            writeln!(
                self.output,
                "\nThis is only a sample! To move ALL matching messages to trash:"
            )?;
        }
        writeln!(self.output, "  gmail-cleaner '{}' --delete", query.as_str())?;
        Ok(())
    }

    fn print_outcome(&mut self, outcome: &BatchOutcome, action: Transition) -> Result<()> {
        writeln!(self.output)?;
        if outcome.succeeded > 0 {
            writeln!(
                self.output,
                "Done: {}/{} messages {}.",
                outcome.succeeded,
                outcome.attempted,
                action.past_tense()
            )?;
        } else {
            writeln!(self.output, "No messages were {}.", action.past_tense())?;
        }

        if !outcome.failures.is_empty() {
            writeln!(
                self.output,
                "{} messages could not be processed.",
                outcome.failed()
            )?;
        }
        if outcome.permission_denied() > 0 {
            writeln!(
                self.output,
                "{} failures were permission errors: the credential lacks the gmail.modify scope. \
                 Run with --reauth or --check-permissions.",
                outcome.permission_denied()
            )?;
        }
        Ok(())
    }
}

fn transition(mut report: RunReport, next: RunState) -> RunReport {
    info!(from = ?report.final_state(), to = ?next, "Run state changed");
    report.states.push(next);
    report
}
