//! Data receiver
//!
//! A receiver is one replica of the sensor store. It owns a [`RecordIndex`]
//! and a local [`VersionVector`] behind a single lock, so snapshots and
//! restores are atomic with respect to message processing. Counters are
//! atomics and are only bumped while that lock is held.

use crate::common::{
    Counter, Error, MessageKind, Result, SensorMessage, SensorRecord, VersionVector,
};
use crate::receiver::index::{RecordIndex, Resolution};
use crate::receiver::snapshot::ReceiverSnapshot;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverState {
    Provisioning,
    Running,
    Stopped,
    Retired,
}

impl ReceiverState {
    /// Can this receiver accept messages?
    pub fn is_running(&self) -> bool {
        matches!(self, ReceiverState::Running)
    }

    /// Can this receiver be brought (back) up?
    pub fn can_start(&self) -> bool {
        !matches!(self, ReceiverState::Retired)
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverState::Provisioning => write!(f, "provisioning"),
            ReceiverState::Running => write!(f, "running"),
            ReceiverState::Stopped => write!(f, "stopped"),
            ReceiverState::Retired => write!(f, "retired"),
        }
    }
}

/// Result of a processed message
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Set for `Data` messages only
    pub resolution: Option<Resolution>,
    /// Local vector after processing
    pub version_vector: VersionVector,
}

/// Read-only registry view of a receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverEntry {
    pub receiver_id: String,
    pub address: String,
    pub state: ReceiverState,
    pub healthy: bool,
    pub total_messages: u64,
    pub conflicts: u64,
    pub records: usize,
}

#[derive(Debug, Default)]
struct ReceiverData {
    index: RecordIndex,
    vector: VersionVector,
}

pub struct DataReceiver {
    receiver_id: String,
    address: String,
    state: Mutex<ReceiverState>,
    inbound_open: AtomicBool,
    data: RwLock<ReceiverData>,
    total_messages: Counter,
    conflicts: Counter,
}

impl DataReceiver {
    /// Create a receiver in the `Provisioning` state
    pub fn new(receiver_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            address: address.into(),
            state: Mutex::new(ReceiverState::Provisioning),
            inbound_open: AtomicBool::new(false),
            data: RwLock::new(ReceiverData::default()),
            total_messages: Counter::new(),
            conflicts: Counter::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.receiver_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Running with an open inbound channel
    pub fn is_healthy(&self) -> bool {
        self.is_running() && self.inbound_open.load(Ordering::Acquire)
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages.get()
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.get()
    }

    // === Lifecycle ===

    /// Provisioning/Stopped → Running
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_start() {
            return Err(Error::ReceiverRetired(self.receiver_id.clone()));
        }
        if *state != ReceiverState::Running {
            tracing::info!("Receiver {} running on {}", self.receiver_id, self.address);
        }
        *state = ReceiverState::Running;
        self.inbound_open.store(true, Ordering::Release);
        Ok(())
    }

    /// Running → Stopped. Returns false if the receiver was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        self.inbound_open.store(false, Ordering::Release);
        if *state != ReceiverState::Running {
            return false;
        }
        *state = ReceiverState::Stopped;
        tracing::info!("Receiver {} stopped", self.receiver_id);
        true
    }

    /// Fault-injection hook: drop to `Stopped` without touching stored data.
    pub fn simulate_failure(&self) -> bool {
        tracing::warn!("Simulating failure of receiver {}", self.receiver_id);
        self.stop()
    }

    /// Close the inbound channel while staying `Running`
    pub fn detach_inbound(&self) {
        self.inbound_open.store(false, Ordering::Release);
    }

    /// Bring the receiver back: Stopped → Running, or reopen a detached
    /// inbound channel. State held in memory is kept.
    pub fn recover(&self) -> Result<()> {
        let previous = self.state();
        self.start()?;
        if previous != ReceiverState::Running {
            tracing::info!(
                "Receiver {} recovered from {} with {} records",
                self.receiver_id,
                previous,
                self.record_count()
            );
        }
        Ok(())
    }

    /// Permanently shut down; the receiver can never run again.
    pub fn retire(&self) {
        let mut state = self.state.lock();
        self.inbound_open.store(false, Ordering::Release);
        if *state != ReceiverState::Retired {
            *state = ReceiverState::Retired;
            tracing::info!("Receiver {} retired", self.receiver_id);
        }
    }

    // === Message processing ===

    /// Apply one message.
    ///
    /// Every kind merges its vector into the local one; `Data` messages also
    /// go through conflict resolution and, when stored, bump this receiver's
    /// own vector entry.
    pub fn process_message(&self, message: &SensorMessage) -> Result<ProcessOutcome> {
        if !self.is_running() {
            return Err(Error::ReceiverUnavailable(self.receiver_id.clone()));
        }

        let mut data = self.data.write();
        data.vector.merge(message.version_vector());

        let resolution = match message.kind() {
            MessageKind::Data => {
                let resolution = data.index.apply(SensorRecord::from_message(message));
                if resolution.is_conflict() {
                    self.conflicts.inc();
                    tracing::debug!(
                        "Receiver {} discarded {} for {}: {:?}",
                        self.receiver_id,
                        message.message_id(),
                        message.sensor_id(),
                        resolution
                    );
                } else {
                    data.vector.increment(&self.receiver_id);
                }
                Some(resolution)
            }
            _ => None,
        };

        self.total_messages.inc();

        Ok(ProcessOutcome {
            resolution,
            version_vector: data.vector.clone(),
        })
    }

    /// Count a conflict observed outside message processing
    pub(crate) fn record_conflict(&self) {
        let _guard = self.data.write();
        self.conflicts.inc();
    }

    /// Delete a sensor's record
    pub fn remove_record(&self, sensor_id: &str) -> bool {
        self.data.write().index.remove(sensor_id).is_some()
    }

    // === Reads ===

    pub fn get_record(&self, sensor_id: &str) -> Option<SensorRecord> {
        self.data.read().index.get(sensor_id).cloned()
    }

    pub fn records(&self) -> Vec<SensorRecord> {
        self.data.read().index.sorted_records()
    }

    pub fn record_count(&self) -> usize {
        self.data.read().index.len()
    }

    pub fn version_vector(&self) -> VersionVector {
        self.data.read().vector.clone()
    }

    pub fn entry(&self) -> ReceiverEntry {
        let state = self.state();
        ReceiverEntry {
            receiver_id: self.receiver_id.clone(),
            address: self.address.clone(),
            state,
            healthy: self.is_healthy(),
            total_messages: self.total_messages(),
            conflicts: self.conflicts(),
            records: self.record_count(),
        }
    }

    // === Backup / restore ===

    /// Deep copy of records, vector and counters
    pub fn create_backup(&self) -> ReceiverSnapshot {
        let data = self.data.read();
        ReceiverSnapshot::new(
            self.receiver_id.clone(),
            data.index.as_map().clone(),
            data.vector.clone(),
            self.total_messages.get(),
            self.conflicts.get(),
        )
    }

    /// Overwrite local state with `snapshot` if it has seen more messages.
    ///
    /// Returns whether the snapshot was applied. This is a replacement, not a
    /// merge.
    pub fn restore_from_backup(&self, snapshot: &ReceiverSnapshot) -> bool {
        let mut data = self.data.write();
        let local_total = self.total_messages.get();
        if snapshot.total_messages() <= local_total {
            return false;
        }

        data.index = RecordIndex::from_map(snapshot.records().clone());
        data.vector = snapshot.version_vector().clone();
        self.total_messages.reset_to(snapshot.total_messages());
        self.conflicts.reset_to(snapshot.conflicts());

        tracing::info!(
            "Receiver {} restored from {}: {} records, {} -> {} messages",
            self.receiver_id,
            snapshot.receiver_id(),
            data.index.len(),
            local_total,
            snapshot.total_messages()
        );
        true
    }
}

impl std::fmt::Debug for DataReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReceiver")
            .field("receiver_id", &self.receiver_id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("total_messages", &self.total_messages())
            .field("conflicts", &self.conflicts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::index::ConflictReason;

    fn running(id: &str) -> DataReceiver {
        let r = DataReceiver::new(id, format!("127.0.0.1:{}", 9000));
        r.start().unwrap();
        r
    }

    #[test]
    fn test_lifecycle() {
        let r = DataReceiver::new("r1", "127.0.0.1:9001");
        assert_eq!(r.state(), ReceiverState::Provisioning);
        assert!(!r.is_healthy());

        r.start().unwrap();
        assert!(r.is_healthy());

        assert!(r.simulate_failure());
        assert_eq!(r.state(), ReceiverState::Stopped);
        assert!(!r.simulate_failure());

        r.recover().unwrap();
        assert!(r.is_healthy());

        r.retire();
        assert!(matches!(r.recover(), Err(Error::ReceiverRetired(_))));
    }

    #[test]
    fn test_detached_inbound_is_unhealthy() {
        let r = running("r1");
        r.detach_inbound();
        assert!(r.is_running());
        assert!(!r.is_healthy());
        r.recover().unwrap();
        assert!(r.is_healthy());
    }

    #[test]
    fn test_stopped_receiver_rejects_messages() {
        let r = running("r1");
        r.simulate_failure();
        let msg = SensorMessage::data("T1", "temperature", 1.0, 1, 1);
        assert!(matches!(
            r.process_message(&msg),
            Err(Error::ReceiverUnavailable(_))
        ));
        assert_eq!(r.total_messages(), 0);
    }

    #[test]
    fn test_state_survives_failure() {
        let r = running("r1");
        r.process_message(&SensorMessage::data("T1", "temperature", 1.0, 1, 1))
            .unwrap();
        r.simulate_failure();
        r.recover().unwrap();
        assert_eq!(r.record_count(), 1);
        assert_eq!(r.total_messages(), 1);
    }

    #[test]
    fn test_heartbeat_only_merges_vector() {
        let r = running("r1");
        let mut vector = VersionVector::new();
        vector.set("gw", 4);
        let msg = SensorMessage::new(MessageKind::Heartbeat, "T1", "temperature", 0.0, 1, vector);

        let outcome = r.process_message(&msg).unwrap();
        assert!(outcome.resolution.is_none());
        assert_eq!(outcome.version_vector.get("gw"), 4);
        assert_eq!(outcome.version_vector.get("r1"), 0);
        assert_eq!(r.record_count(), 0);
        assert_eq!(r.total_messages(), 1);
    }

    #[test]
    fn test_lww_regardless_of_order() {
        let newer = SensorMessage::data("T1", "temperature", 2.0, 20, 1);
        let older = SensorMessage::data("T1", "temperature", 1.0, 10, 1);

        for order in [[&older, &newer], [&newer, &older]] {
            let r = running("r1");
            for msg in order {
                r.process_message(msg).unwrap();
            }
            assert_eq!(r.get_record("T1").unwrap().value, 2.0);
            assert_eq!(r.conflicts(), if order[0].timestamp() == 20 { 1 } else { 0 });
        }
    }

    #[test]
    fn test_stale_resolution_reported() {
        let r = running("r1");
        r.process_message(&SensorMessage::data("T1", "t", 2.0, 20, 1))
            .unwrap();
        let outcome = r
            .process_message(&SensorMessage::data("T1", "t", 1.0, 10, 1))
            .unwrap();
        assert_eq!(
            outcome.resolution,
            Some(Resolution::Discarded(ConflictReason::Stale))
        );
        assert_eq!(outcome.version_vector.get("r1"), 1);
    }

    #[test]
    fn test_backup_restore_idempotent() {
        let r = running("r1");
        for ts in 1..=3 {
            r.process_message(&SensorMessage::data("T1", "t", ts as f64, ts, ts))
                .unwrap();
        }
        let before = r.records();
        let vector = r.version_vector();

        let snapshot = r.create_backup();
        assert!(!r.restore_from_backup(&snapshot));
        assert_eq!(r.records(), before);
        assert_eq!(r.version_vector(), vector);
        assert_eq!(r.total_messages(), 3);
    }

    #[test]
    fn test_restore_overwrites_when_snapshot_is_ahead() {
        let source = running("r1");
        let target = running("r2");
        for ts in 1..=3 {
            source
                .process_message(&SensorMessage::data("A", "t", 1.0, ts, 1))
                .unwrap();
        }
        target
            .process_message(&SensorMessage::data("B", "t", 1.0, 1, 1))
            .unwrap();

        assert!(target.restore_from_backup(&source.create_backup()));
        assert!(target.get_record("B").is_none());
        assert_eq!(target.get_record("A").unwrap().timestamp, 3);
        assert_eq!(target.total_messages(), 3);
        assert_eq!(target.version_vector(), source.version_vector());

        // Older snapshot is ignored
        let stale = DataReceiver::new("r3", "x");
        assert!(!target.restore_from_backup(&stale.create_backup()));
    }

    #[test]
    fn test_remove_record() {
        let r = running("r1");
        r.process_message(&SensorMessage::data("T1", "t", 1.0, 1, 1))
            .unwrap();
        assert!(r.remove_record("T1"));
        assert!(!r.remove_record("T1"));
        assert_eq!(r.entry().records, 0);
    }
}
