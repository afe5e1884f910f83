//! Canonical telemetry message and per-sensor record types

use crate::common::utils::{generate_message_id, timestamp_now_millis};
use crate::common::VersionVector;
use serde::{Deserialize, Serialize};

/// Message kind as produced by protocol adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Register,
    Data,
    Heartbeat,
    Discovery,
    Ack,
    Sync,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageKind::Register => "register",
            MessageKind::Data => "data",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Discovery => "discovery",
            MessageKind::Ack => "ack",
            MessageKind::Sync => "sync",
        };
        f.write_str(s)
    }
}

/// A fully-formed message handed to the coordinator by an adapter.
///
/// Fields are private; a message never changes after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMessage {
    message_id: String,
    sensor_id: String,
    kind: MessageKind,
    content: String,
    value: f64,
    sensor_type: String,
    timestamp: u64,
    version_vector: VersionVector,
}

impl SensorMessage {
    pub fn new(
        kind: MessageKind,
        sensor_id: impl Into<String>,
        sensor_type: impl Into<String>,
        value: f64,
        timestamp: u64,
        version_vector: VersionVector,
    ) -> Self {
        Self {
            message_id: generate_message_id(),
            sensor_id: sensor_id.into(),
            kind,
            content: String::new(),
            value,
            sensor_type: sensor_type.into(),
            timestamp,
            version_vector,
        }
    }

    /// Data reading stamped with the sensor's own clock entry
    pub fn data(
        sensor_id: impl Into<String>,
        sensor_type: impl Into<String>,
        value: f64,
        timestamp: u64,
        clock: u64,
    ) -> Self {
        let sensor_id = sensor_id.into();
        let mut vector = VersionVector::new();
        vector.set(sensor_id.clone(), clock);
        Self::new(MessageKind::Data, sensor_id, sensor_type, value, timestamp, vector)
    }

    /// Registration announcement stamped with the current time
    pub fn register(sensor_id: impl Into<String>, sensor_type: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Register,
            sensor_id,
            sensor_type,
            0.0,
            timestamp_now_millis(),
            VersionVector::new(),
        )
    }

    pub fn heartbeat(sensor_id: impl Into<String>, sensor_type: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Heartbeat,
            sensor_id,
            sensor_type,
            0.0,
            timestamp_now_millis(),
            VersionVector::new(),
        )
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn version_vector(&self) -> &VersionVector {
        &self.version_vector
    }

    /// Clock value of the writing sensor.
    ///
    /// This is the sensor's own vector entry; vectors that do not carry one
    /// fall back to their largest counter.
    pub fn clock(&self) -> u64 {
        match self.version_vector.get(&self.sensor_id) {
            0 => self.version_vector.max_counter(),
            clock => clock,
        }
    }
}

/// Latest known reading of one sensor, held by a receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub sensor_id: String,
    pub value: f64,
    pub sensor_type: String,
    pub timestamp: u64,
    /// Writer clock recorded at write time, used to break timestamp ties
    pub clock: u64,
}

impl SensorRecord {
    pub fn from_message(message: &SensorMessage) -> Self {
        Self {
            sensor_id: message.sensor_id().to_string(),
            value: message.value(),
            sensor_type: message.sensor_type().to_string(),
            timestamp: message.timestamp(),
            clock: message.clock(),
        }
    }
}
