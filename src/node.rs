//! Node assembly
//!
//! Wires one coordinator, the configured receivers and both managers into a
//! running process.

use crate::common::{Config, Result};
use crate::coordinator::{Coordinator, LoggingObserver};
use crate::ops::{FaultToleranceManager, ReplicationManager};
use crate::receiver::DataReceiver;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct SensorNode {
    config: Config,
    coordinator: Arc<Coordinator>,
    replication: Arc<ReplicationManager>,
    fault_tolerance: Arc<FaultToleranceManager>,
}

impl SensorNode {
    /// Build the node and start every configured receiver. Background loops
    /// are not running until [`SensorNode::start`].
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let replication = Arc::new(ReplicationManager::new(config.replication.clone()));
        let coordinator = Arc::new(Coordinator::from_config(config, Arc::clone(&replication)));
        coordinator.subscribe(Arc::new(LoggingObserver));

        for rc in &config.receivers {
            let receiver = DataReceiver::new(rc.id.clone(), rc.address.clone());
            receiver.start()?;
            coordinator.register_receiver(Arc::new(receiver));
        }

        let fault_tolerance = Arc::new(FaultToleranceManager::new(
            config.fault_tolerance.clone(),
            Arc::clone(&coordinator),
        ));

        Ok(Self {
            config: config.clone(),
            coordinator,
            replication,
            fault_tolerance,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn replication(&self) -> &Arc<ReplicationManager> {
        &self.replication
    }

    pub fn fault_tolerance(&self) -> &Arc<FaultToleranceManager> {
        &self.fault_tolerance
    }

    /// Start the replication and fault tolerance loops
    pub fn start(&self) {
        tracing::info!("Starting node {}", self.config.node_id);
        tracing::info!("  Strategy: {:?}", self.config.coordinator.strategy);
        tracing::info!("  Receivers: {}", self.coordinator.registered_receiver_count());
        tracing::info!("  Backup pool: {} slots", self.config.fault_tolerance.backup_pool.len());

        self.replication.start();
        self.fault_tolerance.start();
    }

    /// Stop the managers, then every receiver
    pub async fn shutdown(&self) {
        let grace = self.config.shutdown_grace();
        tracing::info!("Shutting down node {} (grace {:?})", self.config.node_id, grace);

        self.fault_tolerance.stop(grace).await;
        self.replication.stop(grace).await;
        self.coordinator.stop_receivers();

        tracing::info!("Node {} stopped", self.config.node_id);
    }

    /// Run until `shutdown` resolves, logging a status dump every
    /// `status_interval`.
    pub async fn serve<F>(&self, status_interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start();

        let mut ticker = tokio::time::interval(status_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("\n{}", self.coordinator.status_report());
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SensorMessage;

    #[test]
    fn test_from_config_registers_receivers() {
        let node = SensorNode::from_config(&Config::default()).unwrap();
        assert_eq!(node.coordinator().registered_receiver_count(), 3);
        assert_eq!(node.coordinator().running_receiver_count(), 3);
        assert_eq!(node.replication().receivers().len(), 3);
        assert!(node
            .coordinator()
            .route(&SensorMessage::data("T1", "temperature", 20.0, 1, 1), "h", 1));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.fault_tolerance.min_healthy_receivers = 0;
        assert!(SensorNode::from_config(&config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_until_shutdown() {
        let node = SensorNode::from_config(&Config::default()).unwrap();
        let coordinator = node.coordinator().clone();

        node.serve(
            Duration::from_secs(1),
            tokio::time::sleep(Duration::from_secs(3)),
        )
        .await
        .unwrap();

        assert_eq!(coordinator.running_receiver_count(), 0);
    }
}
