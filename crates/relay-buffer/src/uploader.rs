//! Backlog uploader: drains a frozen log strictly in order.

use crate::delivery::{DeliveryFailure, DeliveryHandle, DeliveryOutcome};
use crate::store::is_blank;
use crate::Record;
use thiserror::Error;
use tracing::{debug, warn};

/// What to do with a backlog line that does not parse as a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
    /// Log, count it as skipped, and keep draining. The line is lost.
    #[default]
    Skip,
    /// Stop the drain with the line at the head of the retained backlog.
    /// Nothing behind it is delivered until an operator removes it.
    Halt,
}

/// Why a drain stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrainFailure {
    #[error("delivery failed: {0}")]
    Delivery(DeliveryFailure),
    #[error("malformed backlog line: {0}")]
    Malformed(String),
}

/// Result of draining one backlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every record was delivered (or skipped as malformed).
    Complete { delivered: usize, skipped: usize },
    /// Stopped at the first failure. `remaining` holds the failing line and
    /// every non-empty line after it, byte for byte and in order.
    Aborted {
        delivered: usize,
        skipped: usize,
        remaining: Vec<Vec<u8>>,
        failure: DrainFailure,
    },
}

impl DrainOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            DrainOutcome::Complete { delivered, .. } | DrainOutcome::Aborted { delivered, .. } => {
                *delivered
            }
        }
    }

    pub fn skipped(&self) -> usize {
        match self {
            DrainOutcome::Complete { skipped, .. } | DrainOutcome::Aborted { skipped, .. } => {
                *skipped
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, DrainOutcome::Complete { .. })
    }
}

/// Sends backlog lines through a delivery client one at a time.
pub struct BacklogUploader {
    client: DeliveryHandle,
    malformed: MalformedLinePolicy,
}

impl BacklogUploader {
    pub fn new(client: DeliveryHandle, malformed: MalformedLinePolicy) -> Self {
        Self { client, malformed }
    }

    /// Deliver every line in order, stopping at the first failure.
    ///
    /// Empty lines are ignored. Never skips past a failed delivery: a later
    /// record reaching the collector before an earlier one would break
    /// ordering.
    pub async fn drain(&self, lines: &[Vec<u8>]) -> DrainOutcome {
        let mut delivered = 0;
        let mut skipped = 0;

        for (idx, line) in lines.iter().enumerate() {
            if is_blank(line) {
                continue;
            }

            let record = match parse_line(line) {
                Ok(record) => record,
                Err(e) => match self.malformed {
                    MalformedLinePolicy::Skip => {
                        warn!(line = idx + 1, error = %e, "Skipping malformed backlog line");
                        skipped += 1;
                        continue;
                    }
                    MalformedLinePolicy::Halt => {
                        warn!(line = idx + 1, error = %e, "Malformed backlog line, halting drain");
                        return DrainOutcome::Aborted {
                            delivered,
                            skipped,
                            remaining: retained_from(lines, idx),
                            failure: DrainFailure::Malformed(e),
                        };
                    }
                },
            };

            match self.client.deliver(&record).await {
                DeliveryOutcome::Accepted => {
                    delivered += 1;
                    debug!(
                        agent_id = %record.agent_id,
                        timestamp = %record.timestamp,
                        "Restored upload"
                    );
                }
                DeliveryOutcome::Failed(failure) => {
                    return DrainOutcome::Aborted {
                        delivered,
                        skipped,
                        remaining: retained_from(lines, idx),
                        failure: DrainFailure::Delivery(failure),
                    };
                }
            }
        }

        DrainOutcome::Complete { delivered, skipped }
    }
}

fn parse_line(line: &[u8]) -> Result<Record, String> {
    let text = std::str::from_utf8(line).map_err(|e| format!("invalid UTF-8: {}", e))?;
    Record::from_line(text).map_err(|e| e.to_string())
}

fn retained_from(lines: &[Vec<u8>], idx: usize) -> Vec<Vec<u8>> {
    lines[idx..]
        .iter()
        .filter(|line| !is_blank(line))
        .cloned()
        .collect()
}
