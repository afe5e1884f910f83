//! Receiver and sensor registries
//!
//! Stores:
//! - Receiver registry (registration order, used for selection)
//! - Sensor registry (sensor id → type, sender endpoint, timestamps)
//!
//! Enumeration always returns a cloned snapshot so callers never hold the
//! lock while touching receivers.

use crate::receiver::{DataReceiver, ReceiverEntry};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Registered sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: String,
    pub sensor_type: String,
    pub host: String,
    pub port: u16,
    pub registered_at: u64,
    pub last_seen: u64,
}

#[derive(Debug, Default)]
pub struct ReceiverRegistry {
    receivers: RwLock<Vec<Arc<DataReceiver>>>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a receiver; returns false if the id is already registered
    pub fn insert(&self, receiver: Arc<DataReceiver>) -> bool {
        let mut receivers = self.receivers.write();
        if receivers.iter().any(|r| r.id() == receiver.id()) {
            return false;
        }
        receivers.push(receiver);
        true
    }

    pub fn remove(&self, receiver_id: &str) -> Option<Arc<DataReceiver>> {
        let mut receivers = self.receivers.write();
        let pos = receivers.iter().position(|r| r.id() == receiver_id)?;
        Some(receivers.remove(pos))
    }

    pub fn get(&self, receiver_id: &str) -> Option<Arc<DataReceiver>> {
        self.receivers
            .read()
            .iter()
            .find(|r| r.id() == receiver_id)
            .cloned()
    }

    pub fn contains(&self, receiver_id: &str) -> bool {
        self.receivers.read().iter().any(|r| r.id() == receiver_id)
    }

    /// Snapshot of all receivers in registration order
    pub fn snapshot(&self) -> Vec<Arc<DataReceiver>> {
        self.receivers.read().clone()
    }

    pub fn entries(&self) -> Vec<ReceiverEntry> {
        self.snapshot().iter().map(|r| r.entry()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.receivers.read().iter().filter(|r| r.is_running()).count()
    }

    pub fn len(&self) -> usize {
        self.receivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.read().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: RwLock<HashMap<String, SensorInfo>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a sensor; returns true for a new sensor
    pub fn register(&self, sensor_id: &str, sensor_type: &str, host: &str, port: u16, now: u64) -> bool {
        let mut sensors = self.sensors.write();
        match sensors.get_mut(sensor_id) {
            Some(info) => {
                info.sensor_type = sensor_type.to_string();
                info.host = host.to_string();
                info.port = port;
                info.last_seen = now;
                false
            }
            None => {
                sensors.insert(
                    sensor_id.to_string(),
                    SensorInfo {
                        sensor_id: sensor_id.to_string(),
                        sensor_type: sensor_type.to_string(),
                        host: host.to_string(),
                        port,
                        registered_at: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Update last-seen time of a known sensor
    pub fn touch(&self, sensor_id: &str, now: u64) -> bool {
        match self.sensors.write().get_mut(sensor_id) {
            Some(info) => {
                info.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, sensor_id: &str) -> Option<SensorInfo> {
        self.sensors.write().remove(sensor_id)
    }

    pub fn get(&self, sensor_id: &str) -> Option<SensorInfo> {
        self.sensors.read().get(sensor_id).cloned()
    }

    pub fn list(&self) -> Vec<SensorInfo> {
        let mut sensors: Vec<SensorInfo> = self.sensors.read().values().cloned().collect();
        sensors.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        sensors
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }
}
