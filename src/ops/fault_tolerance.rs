//! Receiver fault tolerance
//!
//! Two periodic loops over the coordinator's registry:
//! - health check: schedule a delayed recovery for every unhealthy receiver
//!   and keep at least `min_healthy_receivers` running
//! - load balance: flag receivers whose message count strays from the mean
//!
//! Recovery first restarts the receiver in place. If that fails the receiver
//! is retired and replaced with one provisioned from the backup pool. Every
//! pool slot is tried at most `max_attempts` times over its lifetime, after
//! which it is abandoned for good.

use crate::common::{BackupSlotConfig, Counter, Error, FaultToleranceConfig, Result, TaskGroup};
use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::receiver::DataReceiver;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Creates replacement receivers from backup pool slots
pub trait ReceiverProvisioner: Send + Sync {
    fn provision(&self, slot: &BackupSlotConfig) -> Result<Arc<DataReceiver>>;
}

/// Starts a fresh in-memory receiver with the slot's identity
#[derive(Debug, Default)]
pub struct InMemoryProvisioner;

impl ReceiverProvisioner for InMemoryProvisioner {
    fn provision(&self, slot: &BackupSlotConfig) -> Result<Arc<DataReceiver>> {
        let receiver = DataReceiver::new(slot.id.clone(), slot.address.clone());
        receiver.start()?;
        Ok(Arc::new(receiver))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    InUse,
    Abandoned,
}

#[derive(Debug)]
struct BackupSlot {
    config: BackupSlotConfig,
    attempts: u32,
    state: SlotState,
}

impl BackupSlot {
    fn exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }
}

/// Serializable view of one pool slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSlotStatus {
    pub id: String,
    pub address: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: SlotState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    AlreadyRunning,
    Restarted,
    Replaced { replacement_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthCheckReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub scheduled: usize,
    pub provisioned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub mean: f64,
    pub imbalanced: Vec<String>,
}

#[derive(Debug, Default)]
struct FaultToleranceStats {
    health_checks: Counter,
    recoveries_scheduled: Counter,
    restarts: Counter,
    replacements: Counter,
    provisioned: Counter,
    exhausted_slots: Counter,
    imbalance_flags: Counter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultToleranceStatsSnapshot {
    pub health_checks: u64,
    pub recoveries_scheduled: u64,
    pub restarts: u64,
    pub replacements: u64,
    pub provisioned: u64,
    pub exhausted_slots: u64,
    pub imbalance_flags: u64,
}

pub struct FaultToleranceManager {
    config: FaultToleranceConfig,
    coordinator: Arc<Coordinator>,
    provisioner: Arc<dyn ReceiverProvisioner>,
    pool: Mutex<Vec<BackupSlot>>,
    pending: Mutex<HashSet<String>>,
    stats: FaultToleranceStats,
    tasks: TaskGroup,
    started: AtomicBool,
}

impl FaultToleranceManager {
    pub fn new(config: FaultToleranceConfig, coordinator: Arc<Coordinator>) -> Self {
        Self::with_provisioner(config, coordinator, Arc::new(InMemoryProvisioner))
    }

    pub fn with_provisioner(
        config: FaultToleranceConfig,
        coordinator: Arc<Coordinator>,
        provisioner: Arc<dyn ReceiverProvisioner>,
    ) -> Self {
        let pool = config
            .backup_pool
            .iter()
            .map(|slot| BackupSlot {
                config: slot.clone(),
                attempts: 0,
                state: SlotState::Available,
            })
            .collect();

        Self {
            config,
            coordinator,
            provisioner,
            pool: Mutex::new(pool),
            pending: Mutex::new(HashSet::new()),
            stats: FaultToleranceStats::default(),
            tasks: TaskGroup::new("fault-tolerance"),
            started: AtomicBool::new(false),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    // === Lifecycle ===

    /// Launch the health-check and load-balance loops. Must be called from
    /// within a Tokio runtime; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            "Fault tolerance started (health check {:?}, grace {:?}, floor {}, {} backup slots)",
            self.config.health_check_interval(),
            self.config.recovery_grace(),
            self.config.min_healthy_receivers,
            self.config.backup_pool.len()
        );

        let weak = Arc::downgrade(self);
        self.tasks.spawn_periodic(
            "health-check",
            self.config.health_check_interval(),
            move || {
                let manager = upgrade(&weak)?;
                manager.run_health_check();
                Ok(())
            },
        );

        let weak = Arc::downgrade(self);
        self.tasks.spawn_periodic(
            "load-balance",
            self.config.load_balance_interval(),
            move || {
                upgrade(&weak)?.run_load_balance_check();
                Ok(())
            },
        );
    }

    pub async fn stop(&self, grace: Duration) {
        self.tasks.shutdown(grace).await;
    }

    // === Health check ===

    /// Schedule a recovery for every unhealthy receiver, then enforce the
    /// floor. Recoveries run after the configured grace period, at most one
    /// in flight per receiver.
    pub fn run_health_check(self: &Arc<Self>) -> HealthCheckReport {
        self.stats.health_checks.inc();
        let health = self.coordinator.health_check();

        let mut report = HealthCheckReport {
            healthy: health.healthy,
            unhealthy: health.unhealthy,
            ..Default::default()
        };

        for receiver_id in health.unhealthy_ids {
            if !self.pending.lock().insert(receiver_id.clone()) {
                tracing::debug!("Recovery of {} already pending", receiver_id);
                continue;
            }

            tracing::warn!(
                "Receiver {} unhealthy, recovery in {:?}",
                receiver_id,
                self.config.recovery_grace()
            );
            self.stats.recoveries_scheduled.inc();
            report.scheduled += 1;

            let weak = Arc::downgrade(self);
            let id = receiver_id.clone();
            self.tasks.spawn_delayed(
                &format!("recover-{}", receiver_id),
                self.config.recovery_grace(),
                move || {
                    if let Some(manager) = weak.upgrade() {
                        let _pending = PendingRecovery {
                            pending: &manager.pending,
                            receiver_id: &id,
                        };
                        match manager.recover_receiver(&id) {
                            Ok(_) => {}
                            Err(e) if e.is_fatal() => {
                                tracing::error!("Recovery of {} failed: {}", id, e)
                            }
                            Err(e) => tracing::warn!("Recovery of {} failed: {}", id, e),
                        }
                    }
                },
            );
        }

        report.provisioned = self.enforce_floor();
        report
    }

    /// Bring one receiver back: restart in place, otherwise replace it from
    /// the backup pool.
    pub fn recover_receiver(&self, receiver_id: &str) -> Result<RecoveryAction> {
        let receiver = self
            .coordinator
            .receiver(receiver_id)
            .ok_or_else(|| Error::UnknownReceiver(receiver_id.to_string()))?;

        if receiver.is_healthy() {
            return Ok(RecoveryAction::AlreadyRunning);
        }

        match receiver.recover() {
            Ok(()) => {
                self.stats.restarts.inc();
                let source = self.coordinator.replication().restore_from_best_peer(&receiver);
                tracing::info!(
                    "Receiver {} restarted (restored from {})",
                    receiver_id,
                    source.as_deref().unwrap_or("none")
                );
                self.coordinator.publish(CoordinatorEvent::ReceiverRecovered {
                    receiver_id: receiver_id.to_string(),
                });
                Ok(RecoveryAction::Restarted)
            }
            Err(e) => {
                tracing::warn!("Restart of {} failed: {}, replacing", receiver_id, e);
                self.replace_receiver(&receiver)
            }
        }
    }

    fn replace_receiver(&self, failed: &DataReceiver) -> Result<RecoveryAction> {
        let failed_id = failed.id().to_string();
        self.coordinator.unregister_receiver(&failed_id);
        failed.retire();
        self.release_slot(&failed_id);

        let replacement = match self.provision_from_pool() {
            Ok(r) => r,
            Err(e) => {
                self.coordinator.publish(CoordinatorEvent::ReceiverFailure {
                    receiver_id: Some(failed_id),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let replacement_id = replacement.id().to_string();
        self.coordinator.register_receiver(replacement);
        self.stats.replacements.inc();
        tracing::info!("Receiver {} replaced by {}", failed_id, replacement_id);
        self.coordinator.publish(CoordinatorEvent::ReceiverReplaced {
            failed_id,
            replacement_id: replacement_id.clone(),
        });
        Ok(RecoveryAction::Replaced { replacement_id })
    }

    // === Backup pool ===

    /// Provision a receiver from the first slot that succeeds. Each available
    /// slot is tried once per call. The receiver is not registered.
    pub fn provision_from_pool(&self) -> Result<Arc<DataReceiver>> {
        let mut abandoned = Vec::new();
        let result = self.try_pool_slots(&mut abandoned);
        self.report_abandoned(abandoned);
        result
    }

    fn try_pool_slots(&self, abandoned: &mut Vec<(String, u32)>) -> Result<Arc<DataReceiver>> {
        let mut pool = self.pool.lock();
        let mut last_error = None;

        for slot in pool.iter_mut().filter(|s| s.state == SlotState::Available) {
            slot.attempts += 1;
            match self.provisioner.provision(&slot.config) {
                Ok(receiver) => {
                    slot.state = SlotState::InUse;
                    self.stats.provisioned.inc();
                    tracing::info!(
                        "Provisioned {} from backup pool (attempt {}/{})",
                        slot.config.id,
                        slot.attempts,
                        slot.config.max_attempts
                    );
                    return Ok(receiver);
                }
                Err(e) => {
                    tracing::warn!(
                        "Provisioning {} failed (attempt {}/{}): {}",
                        slot.config.id,
                        slot.attempts,
                        slot.config.max_attempts,
                        e
                    );
                    if slot.exhausted() {
                        let (slot_id, attempts) = abandon(slot);
                        last_error = Some(Error::RecoveryExhausted {
                            slot: slot_id.clone(),
                            attempts,
                        });
                        abandoned.push((slot_id, attempts));
                    } else {
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(Error::BackupPoolEmpty))
    }

    /// Return the slot a retired receiver was provisioned from
    fn release_slot(&self, receiver_id: &str) {
        let mut abandoned = Vec::new();
        {
            let mut pool = self.pool.lock();
            if let Some(slot) = pool
                .iter_mut()
                .find(|s| s.config.id == receiver_id && s.state == SlotState::InUse)
            {
                if slot.exhausted() {
                    abandoned.push(abandon(slot));
                } else {
                    slot.state = SlotState::Available;
                }
            }
        }
        self.report_abandoned(abandoned);
    }

    /// Count, log and publish abandoned slots. Called with the pool unlocked
    /// so observers may read it.
    fn report_abandoned(&self, abandoned: Vec<(String, u32)>) {
        for (slot_id, attempts) in abandoned {
            self.stats.exhausted_slots.inc();
            tracing::error!("Backup slot {} abandoned after {} attempts", slot_id, attempts);
            self.coordinator
                .publish(CoordinatorEvent::RecoveryExhausted { slot_id, attempts });
        }
    }

    pub fn pool_status(&self) -> Vec<BackupSlotStatus> {
        self.pool
            .lock()
            .iter()
            .map(|s| BackupSlotStatus {
                id: s.config.id.clone(),
                address: s.config.address.clone(),
                attempts: s.attempts,
                max_attempts: s.config.max_attempts,
                state: s.state,
            })
            .collect()
    }

    /// Provision receivers until the running count reaches the floor or the
    /// pool gives out. Receivers with a pending recovery count as running.
    /// Returns how many were added.
    pub fn enforce_floor(&self) -> usize {
        let floor = self.config.min_healthy_receivers;
        let mut added = 0;

        while self.coordinator.running_receiver_count() + self.pending.lock().len() < floor {
            match self.provision_from_pool() {
                Ok(receiver) => {
                    tracing::info!(
                        "Below floor of {} running receivers, adding {}",
                        floor,
                        receiver.id()
                    );
                    self.coordinator.register_receiver(receiver);
                    added += 1;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(
                        "Cannot restore floor of {} running receivers ({} running): {}",
                        floor,
                        self.coordinator.running_receiver_count(),
                        e
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        "Cannot restore floor of {} running receivers ({} running): {}",
                        floor,
                        self.coordinator.running_receiver_count(),
                        e
                    );
                    break;
                }
            }
        }
        added
    }

    // === Load balance ===

    /// Flag running receivers whose message count deviates from the mean by
    /// more than the threshold. Observation only.
    pub fn run_load_balance_check(&self) -> LoadReport {
        let running: Vec<Arc<DataReceiver>> = self
            .coordinator
            .receivers()
            .into_iter()
            .filter(|r| r.is_running())
            .collect();
        if running.is_empty() {
            return LoadReport::default();
        }

        let total: u64 = running.iter().map(|r| r.total_messages()).sum();
        let mean = total as f64 / running.len() as f64;
        let mut report = LoadReport {
            mean,
            imbalanced: Vec::new(),
        };
        if mean == 0.0 {
            return report;
        }

        for receiver in &running {
            let deviation = (receiver.total_messages() as f64 - mean).abs() / mean;
            if deviation > self.config.imbalance_threshold {
                tracing::warn!(
                    "Receiver {} load imbalanced: {} messages vs mean {:.1}",
                    receiver.id(),
                    receiver.total_messages(),
                    mean
                );
                report.imbalanced.push(receiver.id().to_string());
            }
        }
        self.stats.imbalance_flags.add(report.imbalanced.len() as u64);
        report
    }

    pub fn stats(&self) -> FaultToleranceStatsSnapshot {
        let s = &self.stats;
        FaultToleranceStatsSnapshot {
            health_checks: s.health_checks.get(),
            recoveries_scheduled: s.recoveries_scheduled.get(),
            restarts: s.restarts.get(),
            replacements: s.replacements.get(),
            provisioned: s.provisioned.get(),
            exhausted_slots: s.exhausted_slots.get(),
            imbalance_flags: s.imbalance_flags.get(),
        }
    }
}

fn abandon(slot: &mut BackupSlot) -> (String, u32) {
    slot.state = SlotState::Abandoned;
    (slot.config.id.clone(), slot.attempts)
}

/// Clears a receiver's pending-recovery mark when dropped, including on unwind
struct PendingRecovery<'a> {
    pending: &'a Mutex<HashSet<String>>,
    receiver_id: &'a str,
}

impl Drop for PendingRecovery<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.receiver_id);
    }
}

fn upgrade(weak: &Weak<FaultToleranceManager>) -> Result<Arc<FaultToleranceManager>> {
    weak.upgrade()
        .ok_or_else(|| Error::Internal("fault tolerance manager dropped".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ReplicationConfig, SensorMessage};
    use crate::coordinator::RoundRobinStrategy;
    use crate::ops::ReplicationManager;

    fn slot(id: &str, max_attempts: u32) -> BackupSlotConfig {
        BackupSlotConfig {
            id: id.into(),
            address: format!("{}:9100", id),
            max_attempts,
        }
    }

    fn setup(receivers: usize, config: FaultToleranceConfig) -> Arc<FaultToleranceManager> {
        let replication = Arc::new(ReplicationManager::new(ReplicationConfig::default()));
        let coordinator = Arc::new(Coordinator::new(
            "test",
            Box::new(RoundRobinStrategy::new()),
            replication,
        ));
        for i in 1..=receivers {
            let r = DataReceiver::new(format!("r{}", i), format!("127.0.0.1:{}", 9000 + i));
            r.start().unwrap();
            coordinator.register_receiver(Arc::new(r));
        }
        Arc::new(FaultToleranceManager::new(config, coordinator))
    }

    struct FailingProvisioner;

    impl ReceiverProvisioner for FailingProvisioner {
        fn provision(&self, slot: &BackupSlotConfig) -> Result<Arc<DataReceiver>> {
            Err(Error::ProvisionFailed {
                slot: slot.id.clone(),
                reason: "no capacity".into(),
            })
        }
    }

    #[test]
    fn test_restart_in_place() {
        let ft = setup(3, FaultToleranceConfig::default());
        let coord = ft.coordinator().clone();
        coord.route(&SensorMessage::data("T1", "t", 1.0, 1, 1), "h", 1);

        let r2 = coord.receiver("r2").unwrap();
        r2.simulate_failure();
        assert_eq!(ft.recover_receiver("r2").unwrap(), RecoveryAction::Restarted);
        assert!(r2.is_healthy());
        assert_eq!(r2.record_count(), 1);
        assert_eq!(ft.recover_receiver("r2").unwrap(), RecoveryAction::AlreadyRunning);
        assert!(matches!(
            ft.recover_receiver("nope"),
            Err(Error::UnknownReceiver(_))
        ));
    }

    #[test]
    fn test_retired_receiver_replaced_from_pool() {
        let ft = setup(2, FaultToleranceConfig::default());
        let coord = ft.coordinator().clone();
        coord.receiver("r1").unwrap().retire();

        let action = ft.recover_receiver("r1").unwrap();
        assert_eq!(
            action,
            RecoveryAction::Replaced {
                replacement_id: "backup-1".into()
            }
        );
        assert!(coord.receiver("r1").is_none());
        assert!(coord.receiver("backup-1").unwrap().is_healthy());
        assert_eq!(ft.pool_status()[0].state, SlotState::InUse);
        assert_eq!(ft.stats().replacements, 1);
    }

    #[test]
    fn test_released_slot_is_reprovisioned() {
        let config = FaultToleranceConfig {
            backup_pool: vec![slot("b1", 3)],
            ..Default::default()
        };
        let ft = setup(2, config);
        let coord = ft.coordinator().clone();

        coord.receiver("r1").unwrap().retire();
        ft.recover_receiver("r1").unwrap();
        coord.receiver("b1").unwrap().retire();

        let action = ft.recover_receiver("b1").unwrap();
        assert_eq!(
            action,
            RecoveryAction::Replaced {
                replacement_id: "b1".into()
            }
        );
        assert_eq!(ft.pool_status()[0].attempts, 2);
    }

    #[test]
    fn test_exhausted_slot_abandoned() {
        let replication = Arc::new(ReplicationManager::new(ReplicationConfig::default()));
        let coordinator = Arc::new(Coordinator::new(
            "test",
            Box::new(RoundRobinStrategy::new()),
            replication,
        ));
        let mut events = coordinator.event_channel();
        let config = FaultToleranceConfig {
            backup_pool: vec![slot("b1", 2)],
            ..Default::default()
        };
        let ft = FaultToleranceManager::with_provisioner(
            config,
            coordinator,
            Arc::new(FailingProvisioner),
        );

        assert!(matches!(
            ft.provision_from_pool(),
            Err(Error::ProvisionFailed { .. })
        ));
        assert!(matches!(
            ft.provision_from_pool(),
            Err(Error::RecoveryExhausted { attempts: 2, .. })
        ));
        assert!(matches!(ft.provision_from_pool(), Err(Error::BackupPoolEmpty)));
        assert_eq!(ft.pool_status()[0].state, SlotState::Abandoned);
        assert_eq!(ft.stats().exhausted_slots, 1);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind(), "recovery_exhausted");
    }

    #[test]
    fn test_floor_provisions_from_pool() {
        let ft = setup(1, FaultToleranceConfig::default());
        assert_eq!(ft.enforce_floor(), 1);
        assert_eq!(ft.coordinator().running_receiver_count(), 2);
        assert_eq!(ft.enforce_floor(), 0);
    }

    #[test]
    fn test_load_balance_flags_outliers() {
        let ft = setup(3, FaultToleranceConfig::default());
        let coord = ft.coordinator().clone();
        let r1 = coord.receiver("r1").unwrap();
        for ts in 1..=10 {
            r1.process_message(&SensorMessage::data("T1", "t", 1.0, ts, 1))
                .unwrap();
        }
        coord
            .receiver("r2")
            .unwrap()
            .process_message(&SensorMessage::data("T2", "t", 1.0, 1, 1))
            .unwrap();

        let report = ft.run_load_balance_check();
        assert!((report.mean - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.imbalanced, vec!["r1", "r2", "r3"]);

        let balanced = setup(2, FaultToleranceConfig::default());
        assert!(balanced.run_load_balance_check().imbalanced.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_schedules_single_recovery() {
        let config = FaultToleranceConfig {
            recovery_grace_ms: 100,
            ..Default::default()
        };
        let ft = setup(3, config);
        let r1 = ft.coordinator().receiver("r1").unwrap();
        r1.simulate_failure();

        let first = ft.run_health_check();
        assert_eq!(first.unhealthy, 1);
        assert_eq!(first.scheduled, 1);
        assert_eq!(ft.run_health_check().scheduled, 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(r1.is_healthy());
        assert_eq!(ft.stats().restarts, 1);
        assert_eq!(ft.run_health_check().unhealthy, 0);

        ft.stop(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_observer_can_read_pool_on_exhaustion() {
        let config = FaultToleranceConfig {
            backup_pool: vec![slot("b1", 1)],
            ..Default::default()
        };
        let ft = setup(1, config);
        let seen: Arc<Mutex<Vec<SlotState>>> = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&ft);
        let states = seen.clone();
        ft.coordinator()
            .subscribe(Arc::new(move |e: &CoordinatorEvent| -> Result<()> {
                if let CoordinatorEvent::RecoveryExhausted { .. } = e {
                    if let Some(ft) = weak.upgrade() {
                        states.lock().extend(ft.pool_status().iter().map(|s| s.state));
                    }
                }
                Ok(())
            }));

        assert_eq!(ft.enforce_floor(), 1);
        ft.coordinator().receiver("b1").unwrap().retire();
        assert!(matches!(
            ft.recover_receiver("b1"),
            Err(Error::BackupPoolEmpty)
        ));
        assert_eq!(*seen.lock(), vec![SlotState::Abandoned]);
        assert_eq!(ft.stats().exhausted_slots, 1);
    }

    struct PanickingProvisioner;

    impl ReceiverProvisioner for PanickingProvisioner {
        fn provision(&self, _slot: &BackupSlotConfig) -> Result<Arc<DataReceiver>> {
            panic!("provisioner bug")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_cleared_when_recovery_panics() {
        let replication = Arc::new(ReplicationManager::new(ReplicationConfig::default()));
        let coordinator = Arc::new(Coordinator::new(
            "test",
            Box::new(RoundRobinStrategy::new()),
            replication,
        ));
        for i in 1..=3 {
            let r = DataReceiver::new(format!("r{}", i), format!("127.0.0.1:{}", 9000 + i));
            r.start().unwrap();
            coordinator.register_receiver(Arc::new(r));
        }
        let config = FaultToleranceConfig {
            recovery_grace_ms: 100,
            ..Default::default()
        };
        let ft = Arc::new(FaultToleranceManager::with_provisioner(
            config,
            coordinator.clone(),
            Arc::new(PanickingProvisioner),
        ));

        coordinator.receiver("r1").unwrap().retire();
        assert_eq!(ft.run_health_check().scheduled, 1);
        assert_eq!(ft.pending.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(ft.pending.lock().is_empty());
        assert_eq!(coordinator.running_receiver_count(), 2);

        ft.stop(Duration::from_secs(1)).await;
    }
}
