//! Configuration for sensorkv components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SENSORKV_REPLICATION__SYNC_INTERVAL_MS=1000`
const ENV_PREFIX: &str = "SENSORKV";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier of this process)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Grace period granted to periodic tasks on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default)]
    pub fault_tolerance: FaultToleranceConfig,

    /// Receivers started with the process
    #[serde(default = "default_receivers")]
    pub receivers: Vec<ReceiverConfig>,
}

fn default_node_id() -> String {
    "sensorkv-1".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_grace() -> u64 {
    5_000
}
fn default_receivers() -> Vec<ReceiverConfig> {
    (1..=3)
        .map(|i| ReceiverConfig {
            id: format!("receiver-{}", i),
            address: format!("127.0.0.1:{}", 9000 + i),
        })
        .collect()
}

/// Receiver selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
}

/// Coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Receiver selection policy
    #[serde(default)]
    pub strategy: SelectionPolicy,
}

/// Replication manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Pairwise sync period
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,

    /// Backup snapshot period
    #[serde(default = "default_backup_interval")]
    pub backup_interval_ms: u64,

    /// Recovery scan period
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_ms: u64,
}

fn default_sync_interval() -> u64 {
    5_000
}
fn default_backup_interval() -> u64 {
    30_000
}
fn default_recovery_interval() -> u64 {
    10_000
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval(),
            backup_interval_ms: default_backup_interval(),
            recovery_interval_ms: default_recovery_interval(),
        }
    }
}

impl ReplicationConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_millis(self.backup_interval_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }
}

/// Fault tolerance manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultToleranceConfig {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_load_balance_interval")]
    pub load_balance_interval_ms: u64,

    /// Delay before a stopped receiver is restarted
    #[serde(default = "default_recovery_grace")]
    pub recovery_grace_ms: u64,

    /// Floor of running receivers
    #[serde(default = "default_min_healthy")]
    pub min_healthy_receivers: usize,

    /// Relative deviation from the mean load that gets flagged
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,

    /// Pre-configured identities used for replacement receivers
    #[serde(default = "default_backup_pool")]
    pub backup_pool: Vec<BackupSlotConfig>,
}

fn default_health_check_interval() -> u64 {
    5_000
}
fn default_load_balance_interval() -> u64 {
    30_000
}
fn default_recovery_grace() -> u64 {
    2_000
}
fn default_min_healthy() -> usize {
    2
}
fn default_imbalance_threshold() -> f64 {
    0.5
}
fn default_backup_pool() -> Vec<BackupSlotConfig> {
    (1..=2)
        .map(|i| BackupSlotConfig {
            id: format!("backup-{}", i),
            address: format!("127.0.0.1:{}", 9100 + i),
            max_attempts: default_max_attempts(),
        })
        .collect()
}

impl Default for FaultToleranceConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval(),
            load_balance_interval_ms: default_load_balance_interval(),
            recovery_grace_ms: default_recovery_grace(),
            min_healthy_receivers: default_min_healthy(),
            imbalance_threshold: default_imbalance_threshold(),
            backup_pool: default_backup_pool(),
        }
    }
}

impl FaultToleranceConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn load_balance_interval(&self) -> Duration {
        Duration::from_millis(self.load_balance_interval_ms)
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_millis(self.recovery_grace_ms)
    }
}

/// A receiver started at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub id: String,
    pub address: String,
}

/// A backup pool entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSlotConfig {
    pub id: String,
    pub address: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            log_level: default_log_level(),
            shutdown_grace_ms: default_shutdown_grace(),
            coordinator: CoordinatorConfig::default(),
            replication: ReplicationConfig::default(),
            fault_tolerance: FaultToleranceConfig::default(),
            receivers: default_receivers(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then `SENSORKV_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject configurations the managers cannot run with
    pub fn validate(&self) -> Result<()> {
        let r = &self.replication;
        let ft = &self.fault_tolerance;
        let intervals = [
            ("replication.sync_interval_ms", r.sync_interval_ms),
            ("replication.backup_interval_ms", r.backup_interval_ms),
            ("replication.recovery_interval_ms", r.recovery_interval_ms),
            ("fault_tolerance.health_check_interval_ms", ft.health_check_interval_ms),
            ("fault_tolerance.load_balance_interval_ms", ft.load_balance_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        if ft.min_healthy_receivers == 0 {
            return Err(Error::InvalidConfig(
                "fault_tolerance.min_healthy_receivers must be >= 1".into(),
            ));
        }
        if !(ft.imbalance_threshold > 0.0) {
            return Err(Error::InvalidConfig(
                "fault_tolerance.imbalance_threshold must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for id in self
            .receivers
            .iter()
            .map(|r| &r.id)
            .chain(ft.backup_pool.iter().map(|s| &s.id))
        {
            if id.is_empty() {
                return Err(Error::InvalidConfig("receiver id cannot be empty".into()));
            }
            if !seen.insert(id) {
                return Err(Error::InvalidConfig(format!("duplicate receiver id: {}", id)));
            }
        }

        if let Some(slot) = ft.backup_pool.iter().find(|s| s.max_attempts == 0) {
            return Err(Error::InvalidConfig(format!(
                "backup slot {} needs max_attempts >= 1",
                slot.id
            )));
        }

        Ok(())
    }
}
