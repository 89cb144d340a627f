//! Starting the relay, recovering leftovers, and shutting down cleanly.

use super::harness::{seq_record, CountingSource, ScriptedCollector};
use crate::{Relay, RelayConfig, RotationReport, PROCESSING_FILE_NAME};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(dir: &std::path::Path) -> RelayConfig {
    let mut config = RelayConfig::new(dir.join("buffer"));
    config.produce_interval = Duration::from_secs(1);
    config.flush_interval = Duration::from_secs(5);
    config.append_backoff = Duration::from_millis(1);
    config
}

#[tokio::test(start_paused = true)]
async fn healthy_run_delivers_directly_and_stops() {
    let temp_dir = TempDir::new().unwrap();
    let collector = Arc::new(ScriptedCollector::new());

    let handle = Relay::start(config(temp_dir.path()), collector.clone(), CountingSource::new())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let store = handle.store().clone();
    let stats = handle.producer_stats();
    handle.shutdown().await.unwrap();

    assert_eq!(collector.accepted(), vec![1, 2, 3]);
    assert_eq!(stats.snapshot().delivered, 3);
    assert!(!store.active_path().exists());
    assert!(!store.has_processing_log());
}

#[tokio::test(start_paused = true)]
async fn outage_is_buffered_then_replayed() {
    let temp_dir = TempDir::new().unwrap();
    let collector = Arc::new(ScriptedCollector::new());
    collector.set_online(false);

    let mut handle =
        Relay::start(config(temp_dir.path()), collector.clone(), CountingSource::new()).unwrap();
    let mut reports = handle.take_reports().unwrap();
    assert!(handle.take_reports().is_none());

    // Records 1-4 fail over to disk
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    collector.set_online(true);
    // Flush at 5s rotates, flush at 10s drains
    tokio::time::sleep(Duration::from_secs(7)).await;

    let flush_stats = handle.flush_stats();
    let producer_stats = handle.producer_stats();
    handle.shutdown().await.unwrap();

    let mut rotated = false;
    let mut replayed = 0;
    while let Ok(report) = reports.try_recv() {
        rotated |= matches!(report.rotation, RotationReport::Rotated { .. });
        if let Some(drained) = report.drained {
            replayed += drained.delivered;
        }
    }
    assert!(rotated);
    assert_eq!(replayed, 4);

    let accepted = collector.accepted();
    let backlog: Vec<u64> = accepted.iter().copied().filter(|seq| *seq <= 4).collect();
    assert_eq!(backlog, vec![1, 2, 3, 4]);
    assert_eq!(producer_stats.snapshot().buffered, 4);
    assert_eq!(flush_stats.snapshot().delivered, 4);
    assert_eq!(accepted.len() as u64, producer_stats.snapshot().delivered + 4);
}

#[tokio::test(start_paused = true)]
async fn leftover_processing_log_is_drained_first() {
    let temp_dir = TempDir::new().unwrap();
    let buffer_dir = temp_dir.path().join("buffer");
    std::fs::create_dir_all(&buffer_dir).unwrap();
    let leftover = format!(
        "{}\n{}\n",
        seq_record(100).to_line().unwrap(),
        seq_record(101).to_line().unwrap()
    );
    std::fs::write(buffer_dir.join(PROCESSING_FILE_NAME), leftover).unwrap();
    std::fs::write(buffer_dir.join("buffer_processing.jsonl.tmp"), "{half").unwrap();

    let collector = Arc::new(ScriptedCollector::new());
    let handle = Relay::start(config(temp_dir.path()), collector.clone(), CountingSource::new())
        .unwrap();

    assert!(handle.recovery().processing_log_present);
    assert!(handle.recovery().stale_temp_removed);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let store = handle.store().clone();
    handle.shutdown().await.unwrap();

    let accepted = collector.accepted();
    let recovered: Vec<u64> = accepted.iter().copied().filter(|seq| *seq >= 100).collect();
    assert_eq!(recovered, vec![100, 101]);
    assert!(!store.has_processing_log());
    assert!(!buffer_dir.join("buffer_processing.jsonl.tmp").exists());
}

#[tokio::test]
async fn shutdown_before_first_tick_is_clean() {
    let temp_dir = TempDir::new().unwrap();
    let collector = Arc::new(ScriptedCollector::new());

    let handle = Relay::start(config(temp_dir.path()), collector, CountingSource::new()).unwrap();
    handle.shutdown().await.unwrap();
}
