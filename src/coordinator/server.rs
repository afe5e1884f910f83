//! Coordinator
//!
//! The single entry point for adapters. It owns the receiver and sensor
//! registries, asks the selection strategy for a target, forwards messages,
//! merges returned version vectors and publishes events. It is built once per
//! process and shared as `Arc<Coordinator>`.

use crate::common::{
    timestamp_now_millis, Config, Counter, Error, MessageKind, Result, SensorMessage,
    VersionVector,
};
use crate::coordinator::events::{CoordinatorEvent, EventBus, EventObserver, ObserverId};
use crate::coordinator::placement::{strategy_for, SelectionStrategy};
use crate::coordinator::registry::{ReceiverRegistry, SensorInfo, SensorRegistry};
use crate::coordinator::status::{ClusterStatus, HealthReport};
use crate::ops::ReplicationManager;
use crate::receiver::{DataReceiver, ReceiverEntry};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct Coordinator {
    node_id: String,
    receivers: ReceiverRegistry,
    sensors: SensorRegistry,
    strategy: Box<dyn SelectionStrategy>,
    replication: Arc<ReplicationManager>,
    events: EventBus,
    global_vector: Mutex<VersionVector>,
    total_messages: Counter,
    failed_routes: Counter,
}

impl Coordinator {
    pub fn new(
        node_id: impl Into<String>,
        strategy: Box<dyn SelectionStrategy>,
        replication: Arc<ReplicationManager>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            receivers: ReceiverRegistry::new(),
            sensors: SensorRegistry::new(),
            strategy,
            replication,
            events: EventBus::new(),
            global_vector: Mutex::new(VersionVector::new()),
            total_messages: Counter::new(),
            failed_routes: Counter::new(),
        }
    }

    /// Coordinator with the configured strategy. Receivers are not created here.
    pub fn from_config(config: &Config, replication: Arc<ReplicationManager>) -> Self {
        Self::new(
            config.node_id.clone(),
            strategy_for(config.coordinator.strategy),
            replication,
        )
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn replication(&self) -> &Arc<ReplicationManager> {
        &self.replication
    }

    // === Receiver membership ===

    /// Add a receiver. Idempotent: returns false if the id is already known.
    ///
    /// The receiver joins the replication pool and is bootstrapped from the
    /// most complete existing receiver.
    pub fn register_receiver(&self, receiver: Arc<DataReceiver>) -> bool {
        if !self.receivers.insert(Arc::clone(&receiver)) {
            tracing::debug!("Receiver {} already registered", receiver.id());
            return false;
        }

        self.replication.add_receiver(Arc::clone(&receiver));
        tracing::info!(
            "Registered receiver {} at {} ({} total)",
            receiver.id(),
            receiver.address(),
            self.receivers.len()
        );
        self.events.publish(CoordinatorEvent::ReceiverRegistered {
            receiver_id: receiver.id().to_string(),
            address: receiver.address().to_string(),
        });
        true
    }

    /// Remove a receiver from routing and replication. Idempotent.
    pub fn unregister_receiver(&self, receiver_id: &str) -> Option<Arc<DataReceiver>> {
        let removed = self.receivers.remove(receiver_id)?;
        self.replication.remove_receiver(receiver_id);
        tracing::info!("Unregistered receiver {}", receiver_id);
        self.events.publish(CoordinatorEvent::ReceiverUnregistered {
            receiver_id: receiver_id.to_string(),
        });
        Some(removed)
    }

    pub fn receiver(&self, receiver_id: &str) -> Option<Arc<DataReceiver>> {
        self.receivers.get(receiver_id)
    }

    /// Snapshot of registered receivers in registration order
    pub fn receivers(&self) -> Vec<Arc<DataReceiver>> {
        self.receivers.snapshot()
    }

    pub fn receiver_entries(&self) -> Vec<ReceiverEntry> {
        self.receivers.entries()
    }

    pub fn running_receiver_count(&self) -> usize {
        self.receivers.running_count()
    }

    // === Routing ===

    /// Route one message; `false` means no receiver accepted it.
    pub fn route(&self, message: &SensorMessage, sender_host: &str, sender_port: u16) -> bool {
        match self.try_route(message, sender_host, sender_port) {
            Ok(receiver_id) => {
                tracing::debug!(
                    "Routed {} ({}) for {} to {}",
                    message.message_id(),
                    message.kind(),
                    message.sensor_id(),
                    receiver_id
                );
                true
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!("Routing {} failed: {}", message.message_id(), e);
                false
            }
            Err(e) => {
                tracing::warn!("Routing {} failed: {}", message.message_id(), e);
                false
            }
        }
    }

    /// Route one message and return the id of the receiver that accepted it.
    pub fn try_route(
        &self,
        message: &SensorMessage,
        sender_host: &str,
        sender_port: u16,
    ) -> Result<String> {
        self.total_messages.inc();
        self.track_sender(message, sender_host, sender_port);

        let receivers = self.receivers.snapshot();
        let Some(target) = self.strategy.select(message, &receivers) else {
            self.failed_routes.inc();
            self.strategy.on_failure(None, &receivers);
            let err = Error::NoHealthyReceivers;
            self.publish_routing_failure(message, &err);
            return Err(err);
        };

        match target.process_message(message) {
            Ok(outcome) => {
                self.global_vector.lock().merge(&outcome.version_vector);
                self.events.publish(CoordinatorEvent::MessageRouted {
                    message_id: message.message_id().to_string(),
                    sensor_id: message.sensor_id().to_string(),
                    receiver_id: target.id().to_string(),
                });
                Ok(target.id().to_string())
            }
            Err(e) => {
                self.failed_routes.inc();
                self.strategy.on_failure(Some(target.as_ref()), &receivers);
                tracing::warn!("Receiver {} rejected {}: {}", target.id(), message.message_id(), e);
                self.events.publish(CoordinatorEvent::ReceiverFailure {
                    receiver_id: Some(target.id().to_string()),
                    reason: e.to_string(),
                });
                self.publish_routing_failure(message, &e);
                Err(e)
            }
        }
    }

    fn track_sender(&self, message: &SensorMessage, host: &str, port: u16) {
        let now = timestamp_now_millis();
        let sensor_id = message.sensor_id();

        if message.kind() == MessageKind::Register {
            if self
                .sensors
                .register(sensor_id, message.sensor_type(), host, port, now)
            {
                tracing::info!(
                    "Sensor {} ({}) registered from {}:{}",
                    sensor_id,
                    message.sensor_type(),
                    host,
                    port
                );
                if let Some(info) = self.sensors.get(sensor_id) {
                    self.events.publish(CoordinatorEvent::SensorRegistered(info));
                }
            }
        } else {
            self.sensors.touch(sensor_id, now);
        }
    }

    fn publish_routing_failure(&self, message: &SensorMessage, err: &Error) {
        self.events.publish(CoordinatorEvent::RoutingFailed {
            message_id: message.message_id().to_string(),
            sensor_id: message.sensor_id().to_string(),
            reason: err.to_string(),
        });
    }

    // === Sensors ===

    /// Forget a sensor and delete its record from every receiver.
    pub fn unregister_sensor(&self, sensor_id: &str) -> bool {
        let known = self.sensors.remove(sensor_id).is_some();
        let mut removed = 0;
        for receiver in self.receivers.snapshot() {
            if receiver.remove_record(sensor_id) {
                removed += 1;
            }
        }

        if !known && removed == 0 {
            return false;
        }
        tracing::info!("Sensor {} unregistered ({} records removed)", sensor_id, removed);
        self.events.publish(CoordinatorEvent::SensorUnregistered {
            sensor_id: sensor_id.to_string(),
        });
        true
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<SensorInfo> {
        self.sensors.get(sensor_id)
    }

    pub fn sensors(&self) -> Vec<SensorInfo> {
        self.sensors.list()
    }

    // === Events ===

    pub fn subscribe(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn event_channel(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.channel()
    }

    /// Publish an event on behalf of another component
    pub fn publish(&self, event: CoordinatorEvent) {
        self.events.publish(event);
    }

    // === Observability ===

    /// Count healthy and unhealthy receivers. Performs no repair.
    pub fn health_check(&self) -> HealthReport {
        let mut report = HealthReport {
            healthy: 0,
            unhealthy: 0,
            unhealthy_ids: Vec::new(),
        };
        for receiver in self.receivers.snapshot() {
            if receiver.is_healthy() {
                report.healthy += 1;
            } else {
                report.unhealthy += 1;
                report.unhealthy_ids.push(receiver.id().to_string());
            }
        }
        report
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages.get()
    }

    pub fn registered_sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn registered_receiver_count(&self) -> usize {
        self.receivers.len()
    }

    pub fn global_vector(&self) -> VersionVector {
        self.global_vector.lock().clone()
    }

    pub fn status(&self) -> ClusterStatus {
        let receivers = self.receivers.entries();
        ClusterStatus {
            node_id: self.node_id.clone(),
            strategy: self.strategy.name().to_string(),
            registered_sensors: self.sensors.len(),
            registered_receivers: receivers.len(),
            healthy_receivers: receivers.iter().filter(|r| r.healthy).count(),
            total_messages: self.total_messages.get(),
            failed_routes: self.failed_routes.get(),
            global_vector: self.global_vector(),
            receivers,
        }
    }

    /// Human-readable status dump
    pub fn status_report(&self) -> String {
        self.status().to_string()
    }

    /// Stop every registered receiver
    pub fn stop_receivers(&self) {
        for receiver in self.receivers.snapshot() {
            receiver.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ReplicationConfig;
    use crate::coordinator::placement::RoundRobinStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> Coordinator {
        let replication = Arc::new(ReplicationManager::new(ReplicationConfig::default()));
        Coordinator::new("test", Box::new(RoundRobinStrategy::new()), replication)
    }

    fn receiver(id: &str) -> Arc<DataReceiver> {
        let r = DataReceiver::new(id, format!("{}:9000", id));
        r.start().unwrap();
        Arc::new(r)
    }

    #[test]
    fn test_register_is_idempotent() {
        let coord = coordinator();
        let r1 = receiver("r1");
        assert!(coord.register_receiver(r1.clone()));
        assert!(!coord.register_receiver(r1));
        assert_eq!(coord.registered_receiver_count(), 1);
        assert_eq!(coord.replication().receivers().len(), 1);

        assert!(coord.unregister_receiver("r1").is_some());
        assert!(coord.unregister_receiver("r1").is_none());
        assert!(coord.replication().receivers().is_empty());
    }

    #[test]
    fn test_route_merges_global_vector() {
        let coord = coordinator();
        coord.register_receiver(receiver("r1"));
        coord.register_receiver(receiver("r2"));

        assert!(coord.route(&SensorMessage::data("T1", "t", 1.0, 1, 3), "10.0.0.1", 5000));
        assert!(coord.route(&SensorMessage::data("T2", "t", 1.0, 1, 7), "10.0.0.1", 5000));

        let global = coord.global_vector();
        assert_eq!(global.get("T1"), 3);
        assert_eq!(global.get("T2"), 7);
        assert_eq!(global.get("r1"), 1);
        assert_eq!(global.get("r2"), 1);
        assert_eq!(coord.total_messages(), 2);
    }

    #[test]
    fn test_route_without_receivers_fails() {
        let coord = coordinator();
        assert!(!coord.route(&SensorMessage::data("T1", "t", 1.0, 1, 1), "h", 1));
        assert_eq!(coord.total_messages(), 1);
        assert_eq!(coord.status().failed_routes, 1);
    }

    #[test]
    fn test_register_message_tracks_sensor() {
        let coord = coordinator();
        coord.register_receiver(receiver("r1"));

        assert!(coord.route(&SensorMessage::register("T1", "temperature"), "10.0.0.7", 4000));
        let info = coord.sensor("T1").unwrap();
        assert_eq!(info.host, "10.0.0.7");
        assert_eq!(info.port, 4000);
        assert_eq!(coord.registered_sensor_count(), 1);

        assert!(coord.route(&SensorMessage::data("T1", "temperature", 2.0, 10, 1), "10.0.0.7", 4000));
        assert!(coord.unregister_sensor("T1"));
        assert!(coord.receiver("r1").unwrap().get_record("T1").is_none());
        assert!(!coord.unregister_sensor("T1"));
    }

    #[test]
    fn test_health_check_is_read_only() {
        let coord = coordinator();
        let r1 = receiver("r1");
        coord.register_receiver(r1.clone());
        coord.register_receiver(receiver("r2"));
        r1.simulate_failure();

        let report = coord.health_check();
        assert_eq!(report.healthy, 1);
        assert_eq!(report.unhealthy_ids, vec!["r1".to_string()]);
        assert!(!r1.is_running());
    }

    #[test]
    fn test_events_published() {
        let coord = coordinator();
        let routed = Arc::new(AtomicUsize::new(0));
        let counter = routed.clone();
        coord.subscribe(Arc::new(move |e: &CoordinatorEvent| -> Result<()> {
            if let CoordinatorEvent::MessageRouted { .. } = e {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }));
        coord.subscribe(Arc::new(|_: &CoordinatorEvent| -> Result<()> {
            Err(Error::Internal("broken observer".into()))
        }));

        coord.register_receiver(receiver("r1"));
        assert!(coord.route(&SensorMessage::data("T1", "t", 1.0, 1, 1), "h", 1));
        assert_eq!(routed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_dump() {
        let coord = coordinator();
        coord.register_receiver(receiver("r1"));
        coord.route(&SensorMessage::data("T1", "t", 1.0, 1, 1), "h", 1);

        let report = coord.status_report();
        assert!(report.contains("Receivers:       1 (1 healthy)"));
        assert!(report.contains("r1"));

        let metrics = coord.status().render_prometheus();
        assert!(metrics.contains("sensorkv_messages_total 1"));
        assert!(metrics.contains("sensorkv_receiver_conflicts_total{receiver=\"r1\"} 0"));
    }
}
