//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Receiver membership (registry shared with replication)
//! - Sensor registration and last-seen tracking
//! - Target selection (round robin over running receivers)
//! - Forwarding and global version vector tracking
//! - Event fan-out to observers and channel subscribers

pub mod events;
pub mod placement;
pub mod registry;
pub mod server;
pub mod status;

pub use events::{CoordinatorEvent, EventBus, EventObserver, LoggingObserver, ObserverId};
pub use placement::{strategy_for, RoundRobinStrategy, SelectionStrategy};
pub use registry::{ReceiverRegistry, SensorInfo, SensorRegistry};
pub use server::Coordinator;
pub use status::{ClusterStatus, HealthReport};
