//! Relay: wires the production path and the flush loop together.

use crate::coordinator::{FlushCoordinator, FlushStats, TickReport};
use crate::delivery::DeliveryHandle;
use crate::producer::{AppendPolicy, Producer, ProducerStats, RecordSource};
use crate::store::{BufferStore, RecoveryReport};
use crate::uploader::{BacklogUploader, MalformedLinePolicy};
use crate::{RelayError, RelayResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Tick reports held for the consumer; newer ones are dropped when full.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory holding the active store and the processing log.
    pub buffer_dir: PathBuf,
    /// Production cadence.
    pub produce_interval: Duration,
    /// Flush loop cadence.
    pub flush_interval: Duration,
    /// Attempts per buffer append before the record is dropped.
    pub append_attempts: u32,
    /// Pause between append attempts.
    pub append_backoff: Duration,
    pub malformed_lines: MalformedLinePolicy,
}

impl RelayConfig {
    pub fn new(buffer_dir: impl Into<PathBuf>) -> Self {
        let append = AppendPolicy::default();
        Self {
            buffer_dir: buffer_dir.into(),
            produce_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(5),
            append_attempts: append.attempts,
            append_backoff: append.backoff,
            malformed_lines: MalformedLinePolicy::default(),
        }
    }

    fn append_policy(&self) -> AppendPolicy {
        AppendPolicy {
            attempts: self.append_attempts,
            backoff: self.append_backoff,
        }
    }
}

/// Entry point for starting the two loops.
pub struct Relay;

impl Relay {
    /// Recover the buffer directory and spawn the producer and flush tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(
        config: RelayConfig,
        client: DeliveryHandle,
        source: S,
    ) -> RelayResult<RelayHandle>
    where
        S: RecordSource + 'static,
    {
        let store = Arc::new(BufferStore::new(config.buffer_dir.clone()));
        let recovery = store.recover()?;

        let producer = Producer::new(client.clone(), store.clone(), config.append_policy());
        let producer_stats = producer.stats();

        let uploader = BacklogUploader::new(client, config.malformed_lines);
        let coordinator = FlushCoordinator::new(store.clone(), uploader);
        let flush_stats = coordinator.stats();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (report_tx, report_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);

        let producer_task = tokio::spawn(producer.run(
            source,
            config.produce_interval,
            shutdown_rx.clone(),
        ));

        let flush_interval = config.flush_interval;
        let flush_task = tokio::spawn(async move {
            coordinator
                .run(flush_interval, shutdown_rx, Some(report_tx))
                .await
        });

        info!(
            buffer_dir = %config.buffer_dir.display(),
            pending_backlog = recovery.processing_log_present,
            "Relay started"
        );

        Ok(RelayHandle {
            store,
            recovery,
            shutdown: shutdown_tx,
            reports: Some(report_rx),
            producer_stats,
            flush_stats,
            producer_task,
            flush_task,
        })
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    store: Arc<BufferStore>,
    recovery: RecoveryReport,
    shutdown: watch::Sender<bool>,
    reports: Option<mpsc::Receiver<TickReport>>,
    producer_stats: Arc<ProducerStats>,
    flush_stats: Arc<FlushStats>,
    producer_task: JoinHandle<()>,
    flush_task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn store(&self) -> &Arc<BufferStore> {
        &self.store
    }

    /// What startup recovery found.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Take the tick report stream. Returns `None` after the first call.
    pub fn take_reports(&mut self) -> Option<mpsc::Receiver<TickReport>> {
        self.reports.take()
    }

    pub fn producer_stats(&self) -> Arc<ProducerStats> {
        self.producer_stats.clone()
    }

    pub fn flush_stats(&self) -> Arc<FlushStats> {
        self.flush_stats.clone()
    }

    /// Signal both loops and wait for them to finish their current step.
    pub async fn shutdown(self) -> RelayResult<()> {
        let _ = self.shutdown.send(true);

        let producer = self.producer_task.await;
        let flush = self.flush_task.await;
        producer.map_err(|e| RelayError::Task(format!("producer: {}", e)))?;
        flush.map_err(|e| RelayError::Task(format!("flush loop: {}", e)))?;

        info!("Relay stopped");
        Ok(())
    }
}
