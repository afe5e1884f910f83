//! Point-in-time receiver snapshots
//!
//! Snapshots are deep copies held in memory only. They are consumed by
//! another receiver's restore and dropped; nothing here touches disk.

use crate::common::{SensorRecord, VersionVector};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ReceiverSnapshot {
    receiver_id: String,
    records: HashMap<String, SensorRecord>,
    version_vector: VersionVector,
    total_messages: u64,
    conflicts: u64,
    created_at: DateTime<Utc>,
}

impl ReceiverSnapshot {
    pub(crate) fn new(
        receiver_id: String,
        records: HashMap<String, SensorRecord>,
        version_vector: VersionVector,
        total_messages: u64,
        conflicts: u64,
    ) -> Self {
        Self {
            receiver_id,
            records,
            version_vector,
            total_messages,
            conflicts,
            created_at: Utc::now(),
        }
    }

    /// Receiver the snapshot was taken from
    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn records(&self) -> &HashMap<String, SensorRecord> {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn version_vector(&self) -> &VersionVector {
        &self.version_vector
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Destination for periodic backups.
///
/// The default sink only counts what it sees; durable storage would plug in
/// here.
pub trait SnapshotSink: Send + Sync {
    fn store(&self, snapshot: &ReceiverSnapshot) -> crate::Result<()>;
}

/// Sink that logs and drops every snapshot
#[derive(Debug, Default)]
pub struct DiscardSink;

impl SnapshotSink for DiscardSink {
    fn store(&self, snapshot: &ReceiverSnapshot) -> crate::Result<()> {
        tracing::debug!(
            "Backup of {} taken at {}: {} records, {} messages",
            snapshot.receiver_id(),
            snapshot.created_at().to_rfc3339(),
            snapshot.record_count(),
            snapshot.total_messages()
        );
        Ok(())
    }
}
