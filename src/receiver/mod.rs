//! Receiver implementation
//!
//! Each receiver is one in-memory replica of the sensor store:
//! - Last-write-wins resolution with a writer-clock tie break
//! - Local version vector merged from every message
//! - Atomic snapshots and overwrite-style restore
//! - Explicit lifecycle for fault injection and recovery

pub mod index;
pub mod server;
pub mod snapshot;

pub use index::{ConflictReason, RecordIndex, Resolution};
pub use server::{DataReceiver, ProcessOutcome, ReceiverEntry, ReceiverState};
pub use snapshot::{DiscardSink, ReceiverSnapshot, SnapshotSink};
