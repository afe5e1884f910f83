//! Self-healing: restart, replacement and the running floor

use sensorkv::common::{BackupSlotConfig, FaultToleranceConfig, ReplicationConfig, SensorMessage};
use sensorkv::coordinator::{CoordinatorEvent, RoundRobinStrategy};
use sensorkv::ops::SlotState;
use sensorkv::{Coordinator, DataReceiver, FaultToleranceManager, ReplicationManager};
use std::sync::Arc;
use std::time::Duration;

fn coordinator(n: usize) -> Arc<Coordinator> {
    let replication = Arc::new(ReplicationManager::new(ReplicationConfig::default()));
    let coord = Arc::new(Coordinator::new(
        "it",
        Box::new(RoundRobinStrategy::new()),
        replication,
    ));
    for i in 1..=n {
        let r = DataReceiver::new(format!("r{}", i), format!("127.0.0.1:{}", 9000 + i));
        r.start().unwrap();
        coord.register_receiver(Arc::new(r));
    }
    coord
}

fn fast_config() -> FaultToleranceConfig {
    FaultToleranceConfig {
        health_check_interval_ms: 1_000,
        load_balance_interval_ms: 10_000,
        recovery_grace_ms: 200,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_stopped_receiver_restarted_and_restored() {
    let coord = coordinator(3);
    for i in 0..6 {
        let msg = SensorMessage::data(format!("S{}", i), "temperature", i as f64, 1, 1);
        assert!(coord.route(&msg, "10.0.0.1", 5000));
    }

    let r1 = coord.receiver("r1").unwrap();
    r1.simulate_failure();
    for i in 6..10 {
        let msg = SensorMessage::data(format!("S{}", i), "temperature", i as f64, 1, 1);
        assert!(coord.route(&msg, "10.0.0.1", 5000));
    }
    assert_eq!(r1.total_messages(), 2);

    let ft = Arc::new(FaultToleranceManager::new(fast_config(), coord.clone()));
    ft.start();

    // One health-check period plus the recovery grace
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    assert!(r1.is_healthy());
    let peer = coord.replication().most_complete_peer("r1").unwrap();
    assert_eq!(r1.record_count(), peer.record_count());
    assert_eq!(r1.records(), peer.records());
    assert_eq!(ft.stats().restarts, 1);

    ft.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_retired_receiver_replaced_by_health_check() {
    let coord = coordinator(2);
    let mut events = coord.event_channel();
    coord.route(&SensorMessage::data("T1", "temperature", 1.0, 1, 1), "h", 1);
    coord.receiver("r2").unwrap().retire();

    let ft = Arc::new(FaultToleranceManager::new(fast_config(), coord.clone()));
    ft.start();
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    assert!(coord.receiver("r2").is_none());
    let replacement = coord.receiver("backup-1").unwrap();
    assert!(replacement.is_healthy());
    assert_eq!(replacement.get_record("T1").unwrap().value, 1.0);
    assert_eq!(coord.running_receiver_count(), 2);

    let mut replaced = false;
    while let Ok(event) = events.try_recv() {
        if let CoordinatorEvent::ReceiverReplaced { failed_id, replacement_id } = event {
            assert_eq!(failed_id, "r2");
            assert_eq!(replacement_id, "backup-1");
            replaced = true;
        }
    }
    assert!(replaced);

    ft.stop(Duration::from_secs(1)).await;
}

#[test]
fn test_pool_exhaustion_reported() {
    let coord = coordinator(1);
    let mut events = coord.event_channel();
    let config = FaultToleranceConfig {
        min_healthy_receivers: 3,
        backup_pool: vec![BackupSlotConfig {
            id: "b1".into(),
            address: "127.0.0.1:9101".into(),
            max_attempts: 1,
        }],
        ..Default::default()
    };
    let ft = FaultToleranceManager::new(config, coord.clone());

    // The single slot fills one gap, then the floor cannot be met
    assert_eq!(ft.enforce_floor(), 1);
    assert_eq!(coord.running_receiver_count(), 2);

    // Its receiver dies for good; the slot is spent
    coord.receiver("b1").unwrap().retire();
    assert!(ft.recover_receiver("b1").is_err());
    assert_eq!(ft.pool_status()[0].state, SlotState::Abandoned);
    assert_eq!(ft.enforce_floor(), 0);

    let mut exhausted = false;
    while let Ok(event) = events.try_recv() {
        if let CoordinatorEvent::RecoveryExhausted { slot_id, attempts } = event {
            assert_eq!(slot_id, "b1");
            assert_eq!(attempts, 1);
            exhausted = true;
        }
    }
    assert!(exhausted);
}
