//! Integration tests for the relay.
//!
//! - `harness.rs`   - Scripted collector and a store/producer/coordinator rig
//! - `scenarios.rs` - Healthy, outage, recovery and mid-drain failure walkthroughs
//! - `ordering.rs`  - Backlog records reach the collector in append order
//! - `abort.rs`     - A drain stops at the first failure and keeps the suffix
//! - `rotation.rs`  - Atomic handoff and the single processing log
//! - `no_loss.rs`   - Every record arrives under intermittent failure
//! - `lifecycle.rs` - Starting, recovering and stopping the relay

mod abort;
mod lifecycle;
mod scenarios;

#[allow(unused_imports)]
pub use harness::{CollectorResponse, CountingSource, ScriptedCollector, TestHarness};
