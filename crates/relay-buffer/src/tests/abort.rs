//! A drain stops at the first failure.
//!
//! For a backlog of k records failing at record j: 1..j-1 are delivered,
//! j..k stay in the processing log, and the log is not removed.

use super::harness::{seq_of, seq_record, CollectorResponse, TestHarness};
use crate::{
    BacklogUploader, BufferStore, Deliver, DeliveryOutcome, FlushCoordinator, FlushPhase,
    MalformedLinePolicy, Record, RotationReport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const BACKLOG: u64 = 6;

async fn rotated_backlog(harness: &TestHarness) {
    harness.collector.set_online(false);
    for seq in 1..=BACKLOG {
        harness.produce(seq).await;
    }
    harness.tick().await;
    assert_eq!(harness.processing_seqs(), (1..=BACKLOG).collect::<Vec<_>>());
    harness.collector.clear();
}

#[tokio::test]
async fn failure_at_each_position_keeps_the_suffix() {
    for j in 1..=BACKLOG {
        let harness = TestHarness::new();
        rotated_backlog(&harness).await;

        harness.collector.set_online(true);
        for _ in 1..j {
            harness.collector.queue_response(CollectorResponse::Accept);
        }
        harness.collector.queue_response(CollectorResponse::Timeout);

        let report = harness.tick().await;

        let summary = report.drained.unwrap();
        assert_eq!(summary.delivered as u64, j - 1, "failing at {}", j);
        assert_eq!(harness.collector.accepted(), (1..j).collect::<Vec<_>>());
        assert_eq!(harness.processing_seqs(), (j..=BACKLOG).collect::<Vec<_>>());
        assert_eq!(
            report.phase,
            FlushPhase::Retry {
                remaining: (BACKLOG - j + 1) as usize
            }
        );
        // Nothing after the failing record was attempted
        assert_eq!(*harness.collector.attempts().last().unwrap(), j);
    }
}

#[tokio::test]
async fn retry_resumes_at_the_failed_record() {
    let harness = TestHarness::new();
    rotated_backlog(&harness).await;
    harness.collector.set_online(true);
    harness.collector.queue_response(CollectorResponse::Accept);
    harness.collector.queue_response(CollectorResponse::Accept);
    harness.collector.queue_response(CollectorResponse::Reject(500));

    harness.tick().await;
    harness.tick().await;

    assert_eq!(harness.collector.attempts(), vec![1, 2, 3, 3, 4, 5, 6]);
    assert_eq!(harness.collector.accepted(), vec![1, 2, 3, 4, 5, 6]);
    assert!(!harness.store.has_processing_log());
}

#[tokio::test]
async fn repeated_failures_leave_the_log_unchanged() {
    let harness = TestHarness::new();
    rotated_backlog(&harness).await;
    let before = std::fs::read(harness.store.processing_path()).unwrap();

    for _ in 0..3 {
        let report = harness.tick().await;
        assert_eq!(report.rotation, RotationReport::Skipped);
    }

    assert_eq!(std::fs::read(harness.store.processing_path()).unwrap(), before);
    assert_eq!(harness.collector.attempts(), vec![1, 1, 1]);
}

#[tokio::test]
async fn halting_on_malformed_line_keeps_it_at_the_head() {
    let harness = TestHarness::with_policy(MalformedLinePolicy::Halt);
    harness.collector.set_online(false);
    harness.produce(1).await;
    harness.tick().await;
    let mut lines = harness.store.read_processing_log().unwrap().unwrap();
    lines.retain(|line| !line.is_empty());
    lines.insert(0, b"{corrupt".to_vec());
    harness.store.replace_processing_log(&lines).unwrap();
    harness.collector.set_online(true);

    let report = harness.tick().await;

    assert_eq!(report.phase, FlushPhase::Retry { remaining: 2 });
    assert!(harness.collector.accepted().is_empty());
    let kept = harness.store.read_processing_log().unwrap().unwrap();
    assert_eq!(kept[0], b"{corrupt".to_vec());
}

#[tokio::test]
async fn skipping_malformed_line_clears_the_log() {
    let harness = TestHarness::new();
    harness.collector.set_online(false);
    harness.produce(1).await;
    harness.produce(2).await;
    harness.tick().await;
    let mut lines = harness.store.read_processing_log().unwrap().unwrap();
    lines.retain(|line| !line.is_empty());
    lines.insert(1, b"not json at all".to_vec());
    harness.store.replace_processing_log(&lines).unwrap();
    harness.collector.set_online(true);

    let report = harness.tick().await;

    let summary = report.drained.unwrap();
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(harness.collector.accepted(), vec![1, 2]);
    assert!(!harness.store.has_processing_log());
}

#[tokio::test]
async fn halting_keeps_undecodable_bytes_verbatim() {
    let harness = TestHarness::with_policy(MalformedLinePolicy::Halt);
    harness.collector.set_online(false);
    harness.produce(1).await;
    harness.produce(2).await;
    harness.tick().await;
    let mut lines = harness.store.read_processing_log().unwrap().unwrap();
    lines.retain(|line| !line.is_empty());
    let garbled = vec![0xff, b'{', 0xfe, b'}'];
    lines.insert(1, garbled.clone());
    harness.store.replace_processing_log(&lines).unwrap();
    harness.collector.set_online(true);

    let report = harness.tick().await;

    assert_eq!(report.phase, FlushPhase::Retry { remaining: 2 });
    assert_eq!(harness.collector.accepted(), vec![1]);
    let mut expected = garbled;
    expected.push(b'\n');
    expected.extend_from_slice(&lines[2]);
    expected.push(b'\n');
    assert_eq!(
        std::fs::read(harness.store.processing_path()).unwrap(),
        expected
    );
}

#[tokio::test]
async fn unreadable_processing_log_holds_the_tick() {
    let harness = TestHarness::new();
    harness.collector.set_online(false);
    harness.produce(1).await;
    // A directory where the processing log should be cannot be read
    std::fs::create_dir(harness.store.processing_path()).unwrap();
    let active_before = std::fs::read(harness.store.active_path()).unwrap();

    let report = harness.tick().await;

    let summary = report.drained.unwrap();
    assert!(summary.failure.is_some());
    assert_eq!(summary.delivered, 0);
    assert_eq!(report.rotation, RotationReport::Skipped);
    assert_eq!(report.phase, FlushPhase::Retry { remaining: 0 });
    assert!(harness.store.processing_path().is_dir());
    assert_eq!(
        std::fs::read(harness.store.active_path()).unwrap(),
        active_before
    );
    assert_eq!(harness.coordinator.stats().snapshot().rotations, 0);

    // Once readable again the next tick carries on
    std::fs::remove_dir(harness.store.processing_path()).unwrap();
    let report = harness.tick().await;
    assert!(matches!(report.rotation, RotationReport::Rotated { .. }));
    assert_eq!(harness.processing_seqs(), vec![1]);
}

/// Accepts everything, and on the first delivery puts a directory in place
/// of the processing log so that removing it fails.
struct BlockRemoval {
    processing: PathBuf,
    accepted: Mutex<Vec<u64>>,
}

#[async_trait]
impl Deliver for BlockRemoval {
    async fn deliver(&self, record: &Record) -> DeliveryOutcome {
        let mut accepted = self.accepted.lock();
        if accepted.is_empty() {
            std::fs::remove_file(&self.processing).unwrap();
            std::fs::create_dir(&self.processing).unwrap();
        }
        accepted.push(seq_of(record));
        DeliveryOutcome::Accepted
    }
}

#[tokio::test]
async fn failed_removal_after_full_drain_holds_rotation() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(BufferStore::new(temp_dir.path()));
    store.append(&seq_record(1)).unwrap();
    store.append(&seq_record(2)).unwrap();
    store.rotate().unwrap();
    store.append(&seq_record(3)).unwrap();
    let active_before = std::fs::read(store.active_path()).unwrap();

    let client = Arc::new(BlockRemoval {
        processing: store.processing_path().to_path_buf(),
        accepted: Mutex::new(Vec::new()),
    });
    let uploader = BacklogUploader::new(client.clone(), MalformedLinePolicy::Skip);
    let coordinator = FlushCoordinator::new(store.clone(), uploader);

    let report = coordinator.tick().await;

    let summary = report.drained.unwrap();
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.remaining, 2);
    assert!(summary.failure.is_some());
    assert_eq!(report.rotation, RotationReport::Skipped);
    assert_eq!(report.phase, FlushPhase::Retry { remaining: 2 });
    assert_eq!(coordinator.phase(), FlushPhase::Retry { remaining: 2 });
    assert_eq!(*client.accepted.lock(), vec![1, 2]);
    // The newer record was not rotated in behind the stuck log
    assert!(store.processing_path().is_dir());
    assert_eq!(std::fs::read(store.active_path()).unwrap(), active_before);

    std::fs::remove_dir(store.processing_path()).unwrap();
    let report = coordinator.tick().await;
    assert_eq!(report.drained, None);
    assert!(matches!(report.rotation, RotationReport::Rotated { .. }));
    assert_eq!(coordinator.phase(), FlushPhase::Idle);
}
