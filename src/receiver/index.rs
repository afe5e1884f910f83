//! In-memory record index with last-write-wins resolution
//!
//! Each sensor id maps to exactly one [`SensorRecord`]. A candidate record
//! replaces the existing one when its timestamp is newer; equal timestamps are
//! settled by the writer clock so the outcome does not depend on arrival order.

use crate::common::SensorRecord;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Outcome of applying a candidate record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// First record for this sensor
    Inserted,
    /// Candidate won against the existing record
    Replaced,
    /// Candidate lost; the existing record is kept
    Discarded(ConflictReason),
}

impl Resolution {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Resolution::Discarded(_))
    }

    pub fn is_stored(&self) -> bool {
        !self.is_conflict()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Candidate timestamp is older
    Stale,
    /// Same timestamp, candidate clock not higher
    LowerClock,
}

#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    map: HashMap<String, SensorRecord>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Apply a candidate using timestamp order, then writer clock.
    pub fn apply(&mut self, candidate: SensorRecord) -> Resolution {
        match self.map.entry(candidate.sensor_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                Resolution::Inserted
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                let outcome = match candidate.timestamp.cmp(&existing.timestamp) {
                    Ordering::Greater => Resolution::Replaced,
                    Ordering::Less => Resolution::Discarded(ConflictReason::Stale),
                    Ordering::Equal if candidate.clock > existing.clock => Resolution::Replaced,
                    Ordering::Equal => Resolution::Discarded(ConflictReason::LowerClock),
                };
                if outcome == Resolution::Replaced {
                    slot.insert(candidate);
                }
                outcome
            }
        }
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorRecord> {
        self.map.get(sensor_id)
    }

    pub fn remove(&mut self, sensor_id: &str) -> Option<SensorRecord> {
        self.map.remove(sensor_id)
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.map.contains_key(sensor_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SensorRecord)> {
        self.map.iter()
    }

    /// Records sorted by sensor id
    pub fn sorted_records(&self) -> Vec<SensorRecord> {
        let mut records: Vec<SensorRecord> = self.map.values().cloned().collect();
        records.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        records
    }

    pub(crate) fn from_map(map: HashMap<String, SensorRecord>) -> Self {
        Self { map }
    }

    pub(crate) fn as_map(&self) -> &HashMap<String, SensorRecord> {
        &self.map
    }
}
