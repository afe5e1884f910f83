//! Background operations over the receiver pool
//!
//! - [`ReplicationManager`]: pairwise sync, backups and recovery scans
//! - [`FaultToleranceManager`]: health checks, restart/replace and the
//!   running-receiver floor

pub mod fault_tolerance;
pub mod replication;

pub use fault_tolerance::{
    BackupSlotStatus, FaultToleranceManager, FaultToleranceStatsSnapshot, HealthCheckReport,
    InMemoryProvisioner, LoadReport, ReceiverProvisioner, RecoveryAction, SlotState,
};
pub use replication::{
    PairOutcome, RecoveryReport, ReplicationManager, ReplicationStatsSnapshot, SyncReport,
};
