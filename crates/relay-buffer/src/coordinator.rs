//! Flush coordinator: finish the old backlog, then rotate.
//!
//! Each tick runs two steps in a fixed order:
//!
//! 1. If a processing log exists, drain it. A complete drain removes the log
//!    and falls through to step 2. An aborted drain shrinks the log to the
//!    undelivered suffix and ends the tick in [`FlushPhase::Retry`].
//! 2. Rotate the active store into the (now empty) processing slot.
//!
//! Rotation never runs while an older backlog is undelivered, so at most one
//! processing log exists at any time.

use crate::store::{is_blank, BufferStore, Rotation};
use crate::uploader::{BacklogUploader, DrainOutcome};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Where the coordinator stands between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlushPhase {
    /// No undelivered backlog is held over.
    #[default]
    Idle,
    /// A drain is in progress.
    Draining,
    /// The last drain stopped early; `remaining` records wait in the
    /// processing log for the next tick.
    Retry { remaining: usize },
}

/// What the drain step of a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub delivered: usize,
    pub skipped: usize,
    /// Records left in the processing log after this tick.
    pub remaining: usize,
    /// Set when the drain did not clear the processing log.
    pub failure: Option<String>,
}

/// What the rotation step of a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationReport {
    /// Not attempted because the backlog is still undelivered.
    Skipped,
    /// Active store absent or empty.
    Nothing,
    /// A processing log was already present.
    Blocked,
    Rotated { bytes: u64 },
    /// The active store could not be handed off; both files are as they were.
    Failed(String),
}

/// Outcome of one tick, published on the report channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// `None` when there was no processing log to drain.
    pub drained: Option<DrainSummary>,
    pub rotation: RotationReport,
    /// Phase at the end of the tick.
    pub phase: FlushPhase,
}

/// Running counters for the flush loop.
#[derive(Debug, Default)]
pub struct FlushStats {
    ticks: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    drain_failures: AtomicU64,
    rotations: AtomicU64,
    rotation_failures: AtomicU64,
}

/// Point-in-time copy of [`FlushStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    pub ticks: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub drain_failures: u64,
    pub rotations: u64,
    pub rotation_failures: u64,
}

impl FlushStats {
    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            drain_failures: self.drain_failures.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Some(drained) = &report.drained {
            self.delivered
                .fetch_add(drained.delivered as u64, Ordering::Relaxed);
            self.skipped.fetch_add(drained.skipped as u64, Ordering::Relaxed);
            if drained.failure.is_some() {
                self.drain_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        match report.rotation {
            RotationReport::Rotated { .. } => {
                self.rotations.fetch_add(1, Ordering::Relaxed);
            }
            RotationReport::Failed(_) => {
                self.rotation_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Whether the drain step cleared the way for rotation.
enum DrainStep {
    Cleared(Option<DrainSummary>),
    Held(DrainSummary),
}

/// Periodic owner of the processing log.
pub struct FlushCoordinator {
    store: Arc<BufferStore>,
    uploader: BacklogUploader,
    phase: RwLock<FlushPhase>,
    stats: Arc<FlushStats>,
}

impl FlushCoordinator {
    pub fn new(store: Arc<BufferStore>, uploader: BacklogUploader) -> Self {
        Self {
            store,
            uploader,
            phase: RwLock::new(FlushPhase::Idle),
            stats: Arc::new(FlushStats::default()),
        }
    }

    pub fn phase(&self) -> FlushPhase {
        self.phase.read().clone()
    }

    pub fn stats(&self) -> Arc<FlushStats> {
        self.stats.clone()
    }

    /// Run one drain-then-rotate cycle.
    ///
    /// File work runs on the blocking pool; only delivery runs on the caller.
    pub async fn tick(&self) -> TickReport {
        let report = match self.drain_step().await {
            DrainStep::Held(summary) => {
                let phase = FlushPhase::Retry {
                    remaining: summary.remaining,
                };
                self.set_phase(phase.clone());
                TickReport {
                    drained: Some(summary),
                    rotation: RotationReport::Skipped,
                    phase,
                }
            }
            DrainStep::Cleared(drained) => {
                self.set_phase(FlushPhase::Idle);
                TickReport {
                    drained,
                    rotation: self.rotate_step().await,
                    phase: FlushPhase::Idle,
                }
            }
        };

        self.stats.record(&report);
        report
    }

    async fn drain_step(&self) -> DrainStep {
        let read = self
            .store
            .blocking(|store| {
                if !store.has_processing_log() {
                    return Ok(None);
                }
                store.read_processing_log()
            })
            .await;

        let lines = match read {
            Ok(Some(lines)) => lines,
            // No log, or removed between the check and the read
            Ok(None) => return DrainStep::Cleared(None),
            Err(e) => {
                error!(error = %e, "Failed to read processing log, retrying next tick");
                let remaining = self
                    .store
                    .blocking(|store| store.pending_processing_records())
                    .await
                    .unwrap_or(0);
                return DrainStep::Held(DrainSummary {
                    delivered: 0,
                    skipped: 0,
                    remaining,
                    failure: Some(e.to_string()),
                });
            }
        };

        self.set_phase(FlushPhase::Draining);
        let pending = lines.iter().filter(|line| !is_blank(line)).count();
        debug!(records = pending, "Draining processing log");

        match self.uploader.drain(&lines).await {
            DrainOutcome::Complete { delivered, skipped } => {
                let removed = self
                    .store
                    .blocking(|store| store.remove_processing_log())
                    .await;
                if let Err(e) = removed {
                    // Everything went out; the next tick delivers it again
                    error!(
                        critical = true,
                        error = %e,
                        "Failed to remove drained processing log"
                    );
                    return DrainStep::Held(DrainSummary {
                        delivered,
                        skipped,
                        remaining: pending,
                        failure: Some(e.to_string()),
                    });
                }

                info!(
                    delivered = delivered,
                    skipped = skipped,
                    "Backlog drained, processing log removed"
                );
                DrainStep::Cleared(Some(DrainSummary {
                    delivered,
                    skipped,
                    remaining: 0,
                    failure: None,
                }))
            }
            DrainOutcome::Aborted {
                delivered,
                skipped,
                remaining,
                failure,
            } => {
                let retained = remaining.len();
                let rewritten = self
                    .store
                    .blocking(move |store| store.replace_processing_log(&remaining))
                    .await;
                let left = match rewritten {
                    Ok(()) => retained,
                    Err(e) => {
                        // The untouched log still holds every record
                        error!(
                            critical = true,
                            error = %e,
                            "Failed to rewrite processing log, keeping it whole"
                        );
                        pending
                    }
                };

                warn!(
                    delivered = delivered,
                    remaining = left,
                    error = %failure,
                    "Backlog drain failed, retrying next tick"
                );
                DrainStep::Held(DrainSummary {
                    delivered,
                    skipped,
                    remaining: left,
                    failure: Some(failure.to_string()),
                })
            }
        }
    }

    async fn rotate_step(&self) -> RotationReport {
        let rotated = self
            .store
            .blocking(|store| {
                let rotation = store.rotate()?;
                let records = match rotation {
                    Rotation::Rotated { .. } => store.pending_processing_records().unwrap_or(0),
                    _ => 0,
                };
                Ok((rotation, records))
            })
            .await;

        match rotated {
            Ok((Rotation::Rotated { bytes }, records)) => {
                info!(
                    records = records,
                    bytes = bytes,
                    "Rotated buffer into processing slot"
                );
                RotationReport::Rotated { bytes }
            }
            Ok((Rotation::Nothing, _)) => RotationReport::Nothing,
            Ok((Rotation::Blocked, _)) => {
                warn!("Rotation blocked by an existing processing log");
                RotationReport::Blocked
            }
            Err(e) => {
                error!(critical = true, error = %e, "Rotation failed, retrying next tick");
                RotationReport::Failed(e.to_string())
            }
        }
    }

    fn set_phase(&self, phase: FlushPhase) {
        *self.phase.write() = phase;
    }

    /// Tick every `period` until shutdown is signalled.
    ///
    /// A tick in progress always completes before the loop exits. Reports
    /// are offered without waiting; a full or closed channel drops them.
    pub async fn run(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
        reports: Option<mpsc::Sender<TickReport>>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Flush loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if let Some(tx) = &reports {
                        let _ = tx.try_send(report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            ticks = stats.ticks,
            delivered = stats.delivered,
            rotations = stats.rotations,
            "Flush loop stopped"
        );
    }
}
