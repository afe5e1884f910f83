//! Read-only cluster status views

use crate::common::{MetricWriter, VersionVector};
use crate::receiver::ReceiverEntry;
use serde::Serialize;
use std::fmt;

/// Result of [`Coordinator::health_check`](crate::Coordinator::health_check)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub unhealthy_ids: Vec<String>,
}

impl HealthReport {
    pub fn total(&self) -> usize {
        self.healthy + self.unhealthy
    }

    pub fn all_healthy(&self) -> bool {
        self.unhealthy == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub node_id: String,
    pub strategy: String,
    pub registered_sensors: usize,
    pub registered_receivers: usize,
    pub healthy_receivers: usize,
    pub total_messages: u64,
    pub failed_routes: u64,
    pub global_vector: VersionVector,
    pub receivers: Vec<ReceiverEntry>,
}

impl ClusterStatus {
    /// Prometheus text exposition of the status counters
    pub fn render_prometheus(&self) -> String {
        let mut w = MetricWriter::new();
        w.sample(
            "sensorkv_registered_sensors",
            "gauge",
            "Registered sensors",
            self.registered_sensors as u64,
        );
        w.sample(
            "sensorkv_registered_receivers",
            "gauge",
            "Registered receivers",
            self.registered_receivers as u64,
        );
        w.sample(
            "sensorkv_healthy_receivers",
            "gauge",
            "Receivers running with an open inbound channel",
            self.healthy_receivers as u64,
        );
        w.sample(
            "sensorkv_messages_total",
            "counter",
            "Messages handed to the coordinator",
            self.total_messages,
        );
        w.sample(
            "sensorkv_failed_routes_total",
            "counter",
            "Messages no receiver accepted",
            self.failed_routes,
        );

        w.header("sensorkv_receiver_messages_total", "counter", "Messages per receiver");
        for r in &self.receivers {
            w.labelled("sensorkv_receiver_messages_total", "receiver", &r.receiver_id, r.total_messages);
        }
        w.header("sensorkv_receiver_conflicts_total", "counter", "Conflicts per receiver");
        for r in &self.receivers {
            w.labelled("sensorkv_receiver_conflicts_total", "receiver", &r.receiver_id, r.conflicts);
        }
        w.header("sensorkv_receiver_records", "gauge", "Records held per receiver");
        for r in &self.receivers {
            w.labelled("sensorkv_receiver_records", "receiver", &r.receiver_id, r.records as u64);
        }
        w.finish()
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== sensorkv status ({}) ===", self.node_id)?;
        writeln!(f, "Strategy:        {}", self.strategy)?;
        writeln!(f, "Sensors:         {}", self.registered_sensors)?;
        writeln!(
            f,
            "Receivers:       {} ({} healthy)",
            self.registered_receivers, self.healthy_receivers
        )?;
        writeln!(
            f,
            "Messages:        {} ({} failed)",
            self.total_messages, self.failed_routes
        )?;
        writeln!(f, "Global vector:   {}", self.global_vector)?;
        for r in &self.receivers {
            writeln!(
                f,
                "  - {:<12} {:<21} {:<12} healthy={:<5} messages={:<8} conflicts={:<6} records={}",
                r.receiver_id,
                r.address,
                r.state.to_string(),
                r.healthy,
                r.total_messages,
                r.conflicts,
                r.records
            )?;
        }
        Ok(())
    }
}
