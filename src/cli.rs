//! Command-line interface

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::MAX_PAGE_SIZE;
use crate::mutator::Transition;

#[derive(Parser, Debug)]
#[command(name = "gmail-cleaner")]
#[command(version)]
#[command(
    about = "Search Gmail with a filter and move the matching messages to trash",
    long_about = None,
    after_help = "Filter examples: \"from:someone@example.com\", \"is:unread\", \
                  \"has:attachment\", \"older_than:1y\", \"after:2024/01/01\".\n\
                  Always run once without --delete to review the sample first."
)]
pub struct Cli {
    /// Gmail search filter; leave empty to match every message
    #[arg(default_value = "")]
    pub filter: String,

    /// Move every message matching the filter to trash (asks for confirmation)
    #[arg(long, conflicts_with_all = ["restore", "test", "check_permissions"])]
    pub delete: bool,

    /// Restore every matching message from trash; combine with an "in:trash" filter
    #[arg(long, conflicts_with_all = ["test", "check_permissions"])]
    pub restore: bool,

    /// Maximum number of messages in the displayed sample [default: 50]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64))]
    pub max_results: Option<u32>,

    /// Test the connection and show mailbox statistics, then exit
    #[arg(long)]
    pub test: bool,

    /// Verify the granted scopes by trashing and restoring the newest message
    #[arg(long, conflicts_with = "test")]
    pub check_permissions: bool,

    /// Discard the stored credential and authorize again in the browser
    #[arg(long)]
    pub reauth: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "gmail-cleaner.toml")]
    pub config: PathBuf,

    /// Path to the OAuth2 client secret file (overrides the config file)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to the stored credential (overrides the config file)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// What a single invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Show a bounded sample only
    Display,
    /// Sample, then apply a transition to every match
    Mutate(Transition),
    ConnectionTest,
    CheckPermissions,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.test {
            RunMode::ConnectionTest
        } else if self.check_permissions {
            RunMode::CheckPermissions
        } else if self.delete {
            RunMode::Mutate(Transition::Trash)
        } else if self.restore {
            RunMode::Mutate(Transition::Untrash)
        } else {
            RunMode::Display
        }
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        Self::with_multi_progress(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        // Use {elapsed} for human-readable format (e.g., "1s", "234ms")
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar) {
        pb.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
