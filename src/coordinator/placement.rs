//! Receiver selection
//!
//! Receivers are interchangeable replicas, so selection only needs to be fair:
//! round robin over the receivers that are currently running, with the
//! rotation restarted after a forwarding failure.

use crate::common::{SelectionPolicy, SensorMessage};
use crate::receiver::DataReceiver;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks the receiver for each routed message.
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Choose a target among `receivers`, or `None` when nothing can accept.
    fn select(
        &self,
        message: &SensorMessage,
        receivers: &[Arc<DataReceiver>],
    ) -> Option<Arc<DataReceiver>>;

    /// Called when no target was found or forwarding to `failed` did not succeed.
    fn on_failure(&self, failed: Option<&DataReceiver>, receivers: &[Arc<DataReceiver>]);
}

/// Build the strategy for a configured policy
pub fn strategy_for(policy: SelectionPolicy) -> Box<dyn SelectionStrategy> {
    match policy {
        SelectionPolicy::RoundRobin => Box::new(RoundRobinStrategy::new()),
    }
}

/// `counter++ mod running_count`, no affinity and no load metric
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(
        &self,
        _message: &SensorMessage,
        receivers: &[Arc<DataReceiver>],
    ) -> Option<Arc<DataReceiver>> {
        let running: Vec<&Arc<DataReceiver>> =
            receivers.iter().filter(|r| r.is_running()).collect();
        if running.is_empty() {
            return None;
        }

        let slot = self.counter.fetch_add(1, Ordering::Relaxed) % running.len();
        Some(Arc::clone(running[slot]))
    }

    fn on_failure(&self, failed: Option<&DataReceiver>, receivers: &[Arc<DataReceiver>]) {
        self.counter.store(0, Ordering::Relaxed);
        let remaining = receivers.iter().filter(|r| r.is_running()).count();
        match failed {
            Some(r) => tracing::warn!(
                "Receiver {} failed, rotation reset ({} running)",
                r.id(),
                remaining
            ),
            None => tracing::warn!("No receiver available, rotation reset"),
        }
    }
}
