//! Production path: deliver directly, buffer on failure.

use crate::delivery::{DeliveryHandle, DeliveryOutcome};
use crate::store::{AppendOutcome, BufferStore};
use crate::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Bounded retry applied to buffer appends before a record is dropped.
#[derive(Debug, Clone)]
pub struct AppendPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for AppendPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Where a submitted record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Collector accepted it directly; nothing was written to disk.
    Delivered,
    /// Delivery failed and the record is in the active store.
    Buffered,
    /// Delivery failed and the buffer could not be written. The record is gone.
    Dropped { reason: String },
}

/// Something that yields the next record each production tick.
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Record;
}

/// Counters for the production path.
#[derive(Debug, Default)]
pub struct ProducerStats {
    delivered: AtomicU64,
    buffered: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`ProducerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStatsSnapshot {
    pub delivered: u64,
    pub buffered: u64,
    pub dropped: u64,
}

impl ProducerStats {
    pub fn snapshot(&self) -> ProducerStatsSnapshot {
        ProducerStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sends each record straight to the collector and falls back to the
/// buffer when that fails.
pub struct Producer {
    client: DeliveryHandle,
    store: Arc<BufferStore>,
    policy: AppendPolicy,
    stats: Arc<ProducerStats>,
}

impl Producer {
    pub fn new(client: DeliveryHandle, store: Arc<BufferStore>, policy: AppendPolicy) -> Self {
        Self {
            client,
            store,
            policy,
            stats: Arc::new(ProducerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ProducerStats> {
        self.stats.clone()
    }

    /// Deliver one record, buffering it if delivery fails.
    ///
    /// The store lock is taken only inside the append, never across the
    /// network call. The append itself runs on the blocking pool.
    pub async fn submit(&self, record: Record) -> SubmitOutcome {
        let failure = match self.client.deliver(&record).await {
            DeliveryOutcome::Accepted => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                return SubmitOutcome::Delivered;
            }
            DeliveryOutcome::Failed(failure) => failure,
        };

        match self.store.append_with_retry(&record, &self.policy).await {
            AppendOutcome::Stored { attempts } => {
                self.stats.buffered.fetch_add(1, Ordering::Relaxed);
                info!(
                    timestamp = %record.timestamp,
                    attempts = attempts,
                    reason = %failure,
                    "Buffered record"
                );
                SubmitOutcome::Buffered
            }
            AppendOutcome::Dropped { attempts, error } => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    critical = true,
                    timestamp = %record.timestamp,
                    attempts = attempts,
                    error = %error,
                    "Critical I/O error: buffer write failed, record dropped"
                );
                SubmitOutcome::Dropped { reason: error }
            }
        }
    }

    /// Pull a record from `source` every `period` until shutdown is signalled.
    pub async fn run<S: RecordSource>(
        self,
        mut source: S,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Producer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let record = source.next_record();
                    self.submit(record).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            delivered = stats.delivered,
            buffered = stats.buffered,
            dropped = stats.dropped,
            "Producer stopped"
        );
    }
}
