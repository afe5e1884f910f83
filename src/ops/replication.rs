//! Inter-replica synchronization
//!
//! Three periodic loops run over the live receiver pool:
//! - sync: every unordered pair of running receivers; the receiver that has
//!   seen more messages overwrites the other wholesale
//! - backup: snapshot every running receiver into a [`SnapshotSink`]
//! - recovery scan: restart unhealthy receivers and restore them from the
//!   most complete peer
//!
//! Dominance between version vectors is computed for every pair and counted
//! when the vectors are concurrent, but the copy decision is made on message
//! counts alone. Pairwise sync is O(n²) in the number of receivers.

use crate::common::{Counter, ReplicationConfig, TaskGroup};
use crate::receiver::{DataReceiver, DiscardSink, ReceiverState, SnapshotSink};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Outcome of syncing one pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// `target` was overwritten from `source`
    Copied {
        source: String,
        target: String,
        concurrent: bool,
    },
    /// Equal message counts, or the target moved ahead meanwhile
    Skipped { concurrent: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pairs: usize,
    pub copied: usize,
    pub skipped: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub unhealthy: usize,
    pub recovered: usize,
    pub restored: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ReplicationStats {
    sync_cycles: Counter,
    pairs_copied: Counter,
    pairs_skipped: Counter,
    conflicts_detected: Counter,
    backups_taken: Counter,
    backup_failures: Counter,
    recoveries: Counter,
    restores: Counter,
    bootstrap_syncs: Counter,
}

/// Point-in-time copy of the replication counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStatsSnapshot {
    pub sync_cycles: u64,
    pub pairs_copied: u64,
    pub pairs_skipped: u64,
    pub conflicts_detected: u64,
    pub backups_taken: u64,
    pub backup_failures: u64,
    pub recoveries: u64,
    pub restores: u64,
    pub bootstrap_syncs: u64,
}

pub struct ReplicationManager {
    config: ReplicationConfig,
    receivers: RwLock<Vec<Arc<DataReceiver>>>,
    sink: Arc<dyn SnapshotSink>,
    stats: ReplicationStats,
    tasks: TaskGroup,
    started: AtomicBool,
}

impl ReplicationManager {
    pub fn new(config: ReplicationConfig) -> Self {
        Self::with_sink(config, Arc::new(DiscardSink))
    }

    pub fn with_sink(config: ReplicationConfig, sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            config,
            receivers: RwLock::new(Vec::new()),
            sink,
            stats: ReplicationStats::default(),
            tasks: TaskGroup::new("replication"),
            started: AtomicBool::new(false),
        }
    }

    // === Membership ===

    /// Add a receiver to the pool. A running receiver is bootstrapped from the
    /// current most complete peer.
    pub fn add_receiver(&self, receiver: Arc<DataReceiver>) -> bool {
        {
            let mut receivers = self.receivers.write();
            if receivers.iter().any(|r| r.id() == receiver.id()) {
                return false;
            }
            receivers.push(Arc::clone(&receiver));
        }

        if receiver.is_running() {
            self.stats.bootstrap_syncs.inc();
            self.restore_from_best_peer(&receiver);
        }
        true
    }

    pub fn remove_receiver(&self, receiver_id: &str) -> bool {
        let mut receivers = self.receivers.write();
        let before = receivers.len();
        receivers.retain(|r| r.id() != receiver_id);
        receivers.len() != before
    }

    pub fn receivers(&self) -> Vec<Arc<DataReceiver>> {
        self.receivers.read().clone()
    }

    /// Running receiver other than `exclude` with the highest message count
    pub fn most_complete_peer(&self, exclude: &str) -> Option<Arc<DataReceiver>> {
        self.receivers()
            .into_iter()
            .filter(|r| r.id() != exclude && r.is_running())
            .max_by_key(|r| r.total_messages())
    }

    /// Restore `receiver` from the most complete peer. Returns the peer id when
    /// the snapshot was applied.
    pub fn restore_from_best_peer(&self, receiver: &DataReceiver) -> Option<String> {
        let Some(peer) = self.most_complete_peer(receiver.id()) else {
            tracing::warn!(
                "No running peer to restore {} from, keeping its local state",
                receiver.id()
            );
            return None;
        };

        let snapshot = peer.create_backup();
        if receiver.restore_from_backup(&snapshot) {
            self.stats.restores.inc();
            Some(peer.id().to_string())
        } else {
            tracing::debug!(
                "{} is already as complete as {} ({} messages)",
                receiver.id(),
                peer.id(),
                receiver.total_messages()
            );
            None
        }
    }

    // === Cycles ===

    /// One pass over every unordered pair of running receivers
    pub fn run_sync_cycle(&self) -> SyncReport {
        let running: Vec<Arc<DataReceiver>> = self
            .receivers()
            .into_iter()
            .filter(|r| r.is_running())
            .collect();

        let mut report = SyncReport::default();
        for i in 0..running.len() {
            for j in (i + 1)..running.len() {
                report.pairs += 1;
                match self.sync_pair(&running[i], &running[j]) {
                    PairOutcome::Copied { concurrent, .. } => {
                        report.copied += 1;
                        if concurrent {
                            report.conflicts += 1;
                        }
                    }
                    PairOutcome::Skipped { concurrent } => {
                        report.skipped += 1;
                        if concurrent {
                            report.conflicts += 1;
                        }
                    }
                }
            }
        }

        self.stats.sync_cycles.inc();
        if report.copied > 0 || report.conflicts > 0 {
            tracing::info!(
                "Sync cycle: {} pairs, {} copied, {} concurrent",
                report.pairs,
                report.copied,
                report.conflicts
            );
        }
        report
    }

    /// Sync two receivers one way, from the one that has seen more messages.
    ///
    /// When the vectors are concurrent the overwritten receiver loses writes
    /// the source never saw; that loss is counted as a conflict on it.
    pub fn sync_pair(&self, a: &DataReceiver, b: &DataReceiver) -> PairOutcome {
        let concurrent = a.version_vector().concurrent_with(&b.version_vector());
        if concurrent {
            self.stats.conflicts_detected.inc();
        }

        let (ta, tb) = (a.total_messages(), b.total_messages());
        if ta == tb {
            self.stats.pairs_skipped.inc();
            return PairOutcome::Skipped { concurrent };
        }

        let (source, target) = if ta > tb { (a, b) } else { (b, a) };
        let snapshot = source.create_backup();
        if !target.restore_from_backup(&snapshot) {
            self.stats.pairs_skipped.inc();
            return PairOutcome::Skipped { concurrent };
        }

        if concurrent {
            target.record_conflict();
        }
        self.stats.pairs_copied.inc();
        PairOutcome::Copied {
            source: source.id().to_string(),
            target: target.id().to_string(),
            concurrent,
        }
    }

    /// Snapshot every running receiver into the sink; returns snapshots taken
    pub fn run_backup_cycle(&self) -> usize {
        let mut taken = 0;
        for receiver in self.receivers().iter().filter(|r| r.is_running()) {
            let snapshot = receiver.create_backup();
            match self.sink.store(&snapshot) {
                Ok(()) => {
                    taken += 1;
                    self.stats.backups_taken.inc();
                }
                Err(e) => {
                    self.stats.backup_failures.inc();
                    tracing::warn!("Backup of {} failed: {}", receiver.id(), e);
                }
            }
        }
        taken
    }

    /// Restart every unhealthy receiver and restore it from its best peer
    pub fn run_recovery_scan(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for receiver in self.receivers() {
            if receiver.is_healthy() || receiver.state() == ReceiverState::Retired {
                continue;
            }
            report.unhealthy += 1;

            match receiver.recover() {
                Ok(()) => {
                    report.recovered += 1;
                    self.stats.recoveries.inc();
                    if self.restore_from_best_peer(&receiver).is_some() {
                        report.restored += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Recovery of {} failed: {}", receiver.id(), e);
                }
            }
        }
        report
    }

    // === Lifecycle ===

    /// Launch the sync, backup and recovery loops. Must be called from within
    /// a Tokio runtime; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            "Replication manager started (sync {:?}, backup {:?}, recovery {:?})",
            self.config.sync_interval(),
            self.config.backup_interval(),
            self.config.recovery_interval()
        );

        let weak = Arc::downgrade(self);
        self.tasks.spawn_periodic(
            "sync",
            self.config.sync_interval(),
            with_manager(&weak, |m| {
                m.run_sync_cycle();
            }),
        );
        self.tasks.spawn_periodic(
            "backup",
            self.config.backup_interval(),
            with_manager(&weak, |m| {
                m.run_backup_cycle();
            }),
        );
        self.tasks.spawn_periodic(
            "recovery",
            self.config.recovery_interval(),
            with_manager(&weak, |m| {
                let report = m.run_recovery_scan();
                if report.unhealthy > 0 {
                    tracing::info!("Recovery scan: {:?}", report);
                }
            }),
        );
    }

    pub async fn stop(&self, grace: Duration) {
        self.tasks.shutdown(grace).await;
    }

    pub fn stats(&self) -> ReplicationStatsSnapshot {
        let s = &self.stats;
        ReplicationStatsSnapshot {
            sync_cycles: s.sync_cycles.get(),
            pairs_copied: s.pairs_copied.get(),
            pairs_skipped: s.pairs_skipped.get(),
            conflicts_detected: s.conflicts_detected.get(),
            backups_taken: s.backups_taken.get(),
            backup_failures: s.backup_failures.get(),
            recoveries: s.recoveries.get(),
            restores: s.restores.get(),
            bootstrap_syncs: s.bootstrap_syncs.get(),
        }
    }
}

fn with_manager<F>(weak: &Weak<ReplicationManager>, run: F) -> impl FnMut() -> crate::Result<()>
where
    F: Fn(&ReplicationManager) + Send + 'static,
{
    let weak = weak.clone();
    move || match weak.upgrade() {
        Some(manager) => {
            run(&manager);
            Ok(())
        }
        None => Err(crate::Error::Internal("replication manager dropped".into())),
    }
}
