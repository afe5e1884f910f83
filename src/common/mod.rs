//! Common utilities and types shared across sensorkv

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod tasks;
pub mod utils;
pub mod version;

pub use config::{
    BackupSlotConfig, Config, CoordinatorConfig, FaultToleranceConfig, ReceiverConfig,
    ReplicationConfig, SelectionPolicy,
};
pub use error::{Error, Result};
pub use message::{MessageKind, SensorMessage, SensorRecord};
pub use metrics::{Counter, MetricWriter};
pub use tasks::TaskGroup;
pub use utils::{generate_message_id, parse_duration, timestamp_now_millis};
pub use version::VersionVector;
