//! Coordinator event fan-out
//!
//! Events are delivered two ways: synchronously to registered observers, and
//! to any number of channel subscribers through a Tokio broadcast channel.
//! An observer that errors or panics is logged and skipped; delivery to the
//! others continues and the publisher never sees the failure.

use crate::common::Result;
use crate::coordinator::registry::SensorInfo;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Event published by the coordinator and the managers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    SensorRegistered(SensorInfo),
    SensorUnregistered {
        sensor_id: String,
    },
    ReceiverRegistered {
        receiver_id: String,
        address: String,
    },
    ReceiverUnregistered {
        receiver_id: String,
    },
    ReceiverFailure {
        receiver_id: Option<String>,
        reason: String,
    },
    ReceiverRecovered {
        receiver_id: String,
    },
    ReceiverReplaced {
        failed_id: String,
        replacement_id: String,
    },
    RecoveryExhausted {
        slot_id: String,
        attempts: u32,
    },
    MessageRouted {
        message_id: String,
        sensor_id: String,
        receiver_id: String,
    },
    RoutingFailed {
        message_id: String,
        sensor_id: String,
        reason: String,
    },
}

impl CoordinatorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorEvent::SensorRegistered(_) => "sensor_registered",
            CoordinatorEvent::SensorUnregistered { .. } => "sensor_unregistered",
            CoordinatorEvent::ReceiverRegistered { .. } => "receiver_registered",
            CoordinatorEvent::ReceiverUnregistered { .. } => "receiver_unregistered",
            CoordinatorEvent::ReceiverFailure { .. } => "receiver_failure",
            CoordinatorEvent::ReceiverRecovered { .. } => "receiver_recovered",
            CoordinatorEvent::ReceiverReplaced { .. } => "receiver_replaced",
            CoordinatorEvent::RecoveryExhausted { .. } => "recovery_exhausted",
            CoordinatorEvent::MessageRouted { .. } => "message_routed",
            CoordinatorEvent::RoutingFailed { .. } => "routing_failed",
        }
    }
}

/// Synchronous event subscriber
pub trait EventObserver: Send + Sync {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_event(&self, event: &CoordinatorEvent) -> Result<()>;
}

impl<F> EventObserver for F
where
    F: Fn(&CoordinatorEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &CoordinatorEvent) -> Result<()> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct EventBus {
    observers: RwLock<Vec<(ObserverId, Arc<dyn EventObserver>)>>,
    next_id: AtomicU64,
    channel: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (channel, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel,
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Channel subscription; lagging receivers lose the oldest events
    pub fn channel(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.channel.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn publish(&self, event: CoordinatorEvent) {
        let observers = self.observers.read().clone();
        for (_, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    "Observer {} failed on {}: {}",
                    observer.name(),
                    event.kind(),
                    e
                ),
                Err(_) => tracing::error!(
                    "Observer {} panicked on {}",
                    observer.name(),
                    event.kind()
                ),
            }
        }

        // No channel subscribers is not an error
        let _ = self.channel.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event log line
#[derive(Debug, Serialize)]
struct EventLogEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a CoordinatorEvent,
}

/// Observer that writes each event as a JSON line to the tracing log
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl EventObserver for LoggingObserver {
    fn name(&self) -> &str {
        "event-log"
    }

    fn on_event(&self, event: &CoordinatorEvent) -> Result<()> {
        let entry = EventLogEntry {
            timestamp: Utc::now(),
            event,
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| crate::Error::Internal(format!("Serialize error: {}", e)))?;
        match event {
            CoordinatorEvent::MessageRouted { .. } => tracing::trace!(target: "sensorkv::events", "{}", line),
            _ => tracing::info!(target: "sensorkv::events", "{}", line),
        }
        Ok(())
    }
}
