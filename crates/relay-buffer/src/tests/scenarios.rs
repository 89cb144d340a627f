//! Walkthrough of one outage: healthy, down, recovered, down again mid-drain.
//!
//! - A. Healthy network: records 1-3 delivered directly, no buffer file
//! - B. Network down: records 4-6 buffered in order, no processing log
//! - C. Network back: one tick rotates, the next drains 4, 5, 6 and removes
//!   the processing log
//! - D. Failure at record 5: 4 delivered, {5, 6} retained, retried from 5

use super::harness::{CollectorResponse, TestHarness};
use crate::{FlushPhase, RotationReport, SubmitOutcome};

async fn healthy_then_outage(harness: &TestHarness) {
    for seq in 1..=3 {
        assert_eq!(harness.produce(seq).await, SubmitOutcome::Delivered);
    }
    harness.collector.set_online(false);
    for seq in 4..=6 {
        assert_eq!(harness.produce(seq).await, SubmitOutcome::Buffered);
    }
}

/// A: every record goes straight through and nothing touches disk
#[tokio::test]
async fn scenario_a_healthy_network() {
    let harness = TestHarness::new();

    for seq in 1..=3 {
        assert_eq!(harness.produce(seq).await, SubmitOutcome::Delivered);
    }

    assert_eq!(harness.collector.accepted(), vec![1, 2, 3]);
    assert!(!harness.store.active_path().exists());
    assert!(!harness.store.has_processing_log());
}

/// B: failed deliveries land in the active store, one line each, in order
#[tokio::test]
async fn scenario_b_network_down() {
    let harness = TestHarness::new();

    healthy_then_outage(&harness).await;

    assert_eq!(harness.active_seqs(), vec![4, 5, 6]);
    assert!(!harness.store.has_processing_log());
    assert_eq!(harness.collector.accepted(), vec![1, 2, 3]);
}

/// C: recovery drains the backlog in order and removes the processing log
#[tokio::test]
async fn scenario_c_network_recovers() {
    let harness = TestHarness::new();
    healthy_then_outage(&harness).await;
    harness.collector.set_online(true);

    let rotate = harness.tick().await;
    assert!(matches!(rotate.rotation, RotationReport::Rotated { .. }));
    assert!(!harness.store.active_path().exists());
    assert_eq!(harness.processing_seqs(), vec![4, 5, 6]);

    let drain = harness.tick().await;
    let summary = drain.drained.unwrap();
    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.failure, None);
    assert_eq!(drain.phase, FlushPhase::Idle);

    assert_eq!(harness.collector.accepted(), vec![1, 2, 3, 4, 5, 6]);
    assert!(!harness.store.has_processing_log());
}

/// D: failure on record 5 keeps {5, 6}; the next tick resumes at 5
#[tokio::test]
async fn scenario_d_failure_mid_drain() {
    let harness = TestHarness::new();
    healthy_then_outage(&harness).await;
    harness.collector.set_online(true);
    harness.tick().await;

    harness.collector.queue_response(CollectorResponse::Accept);
    harness.collector.queue_response(CollectorResponse::Reject(503));
    let failed = harness.tick().await;

    let summary = failed.drained.unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.remaining, 2);
    assert!(summary.failure.is_some());
    assert_eq!(failed.rotation, RotationReport::Skipped);
    assert_eq!(failed.phase, FlushPhase::Retry { remaining: 2 });
    assert_eq!(harness.processing_seqs(), vec![5, 6]);

    let retried = harness.tick().await;
    assert_eq!(retried.drained.unwrap().delivered, 2);
    assert_eq!(retried.phase, FlushPhase::Idle);

    assert_eq!(harness.collector.attempts()[6..].to_vec(), vec![4, 5, 5, 6]);
    assert_eq!(harness.collector.accepted(), vec![1, 2, 3, 4, 5, 6]);
    assert!(!harness.store.has_processing_log());
}
