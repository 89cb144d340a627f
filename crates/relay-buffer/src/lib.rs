//! Store-and-forward relay for edge telemetry.
//!
//! Records that cannot be delivered to the collector are appended to an
//! on-disk log. A periodic flush coordinator hands that log off to a single
//! processing slot by atomic rename and drains it, in order, once the
//! network is back.
//!
//! # Core Invariants
//!
//! 1. **Single Processing Log**: a new rotation never happens while an older
//!    backlog is still undelivered
//! 2. **Ordered Drain**: backlog records reach the collector in append order
//! 3. **Atomic Handoff**: an append lands entirely before or entirely after a
//!    rotation, never split across both files
//! 4. **Abort On First Failure**: a drain stops at the first failed delivery
//!    and keeps that record and everything after it
//!
//! # Architecture
//!
//! ```text
//! Producer -> Deliver -> Collector
//!     | (failed)
//!     v
//! BufferStore (buffer.jsonl) --rotate--> buffer_processing.jsonl
//!                                              |
//!             FlushCoordinator -> BacklogUploader -> Deliver
//! ```

pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod producer;
pub mod record;
pub mod relay;
pub mod store;
pub mod uploader;

#[cfg(test)]
mod tests;

pub use coordinator::{
    DrainSummary, FlushCoordinator, FlushPhase, FlushStats, FlushStatsSnapshot, RotationReport,
    TickReport,
};
pub use delivery::{
    Deliver, DeliveryConfig, DeliveryFailure, DeliveryHandle, DeliveryOutcome, HttpDeliveryClient,
};
pub use error::{RelayError, RelayResult};
pub use producer::{
    AppendPolicy, Producer, ProducerStats, ProducerStatsSnapshot, RecordSource, SubmitOutcome,
};
pub use record::Record;
pub use relay::{Relay, RelayConfig, RelayHandle};
pub use store::{
    AppendOutcome, BufferStore, RecoveryReport, Rotation, ACTIVE_FILE_NAME, PROCESSING_FILE_NAME,
};
pub use uploader::{BacklogUploader, DrainFailure, DrainOutcome, MalformedLinePolicy};
