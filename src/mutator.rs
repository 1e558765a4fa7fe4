//! Best-effort batch mutation of messages
//!
//! Each message is one request. A failure on one item is recorded and the
//! loop moves on; nothing is rolled back, so a batch that fails halfway
//! leaves the earlier items mutated.

use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::Result;
use crate::models::{BatchOutcome, FailureReason, ItemFailure, MessageRef};

/// State transition applied to each message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Trash,
    Untrash,
}

impl Transition {
    pub fn verb(&self) -> &'static str {
        match self {
            Transition::Trash => "trash",
            Transition::Untrash => "restore",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Transition::Trash => "moved to trash",
            Transition::Untrash => "restored from trash",
        }
    }
}

/// Progress snapshot handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub succeeded: usize,
    pub total: usize,
    pub batch: usize,
    pub batches: usize,
}

impl BatchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

pub struct BatchMutator<'a> {
    client: &'a dyn GmailClient,
    batch_size: usize,
    progress_interval: usize,
}

impl<'a> BatchMutator<'a> {
    pub fn new(client: &'a dyn GmailClient, batch_size: usize, progress_interval: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            progress_interval: progress_interval.max(1),
        }
    }

    async fn apply_one(&self, message_ref: &MessageRef, transition: Transition) -> Result<()> {
        match transition {
            Transition::Trash => self.client.trash(message_ref.id()).await,
            Transition::Untrash => self.client.untrash(message_ref.id()).await,
        }
    }

    /// Apply `transition` to every message in order
    ///
    /// `on_progress` fires every `progress_interval` items and at the end of
    /// each batch.
    pub async fn apply<P>(
        &self,
        refs: &[MessageRef],
        transition: Transition,
        mut on_progress: P,
    ) -> BatchOutcome
    where
        P: FnMut(&BatchProgress),
    {
        let total = refs.len();
        let mut outcome = BatchOutcome::default();
        if total == 0 {
            return outcome;
        }

        let batches = (total + self.batch_size - 1) / self.batch_size;
        info!(
            "Applying {} to {} messages in {} batches",
            transition.verb(),
            total,
            batches
        );

        for (batch_index, batch) in refs.chunks(self.batch_size).enumerate() {
            debug!(
                "Batch {}/{} ({} messages)",
                batch_index + 1,
                batches,
                batch.len()
            );

            for (position, message_ref) in batch.iter().enumerate() {
                outcome.attempted += 1;

                match self.apply_one(message_ref, transition).await {
                    Ok(()) => outcome.succeeded += 1,
                    Err(e) => {
                        if e.is_permission_denied() {
                            warn!(
                                "Permission denied for {} on {}; the credential may lack the gmail.modify scope: {}",
                                transition.verb(),
                                message_ref,
                                e
                            );
                        } else {
                            warn!("Failed to {} message {}: {}", transition.verb(), message_ref, e);
                        }
                        outcome.failures.push(ItemFailure {
                            message_ref: message_ref.clone(),
                            reason: FailureReason::from(&e),
                        });
                    }
                }

                let end_of_batch = position + 1 == batch.len();
                if (position + 1) % self.progress_interval == 0 || end_of_batch {
                    on_progress(&BatchProgress {
                        processed: outcome.attempted,
                        succeeded: outcome.succeeded,
                        total,
                        batch: batch_index + 1,
                        batches,
                    });
                }
            }
        }

        info!(
            "{}/{} messages {} ({} failed)",
            outcome.succeeded,
            outcome.attempted,
            transition.past_tense(),
            outcome.failed()
        );
        if outcome.permission_denied() > 0 {
            warn!(
                "{} messages failed with permission denied; re-authenticate with --reauth",
                outcome.permission_denied()
            );
        }

        outcome
    }
}
