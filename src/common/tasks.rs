//! Background task group with cooperative shutdown
//!
//! Every manager owns a [`TaskGroup`]. Periodic tasks run on a fixed
//! interval until the group's shutdown flag flips; a failed or panicking run
//! is logged and the next tick runs as usual.

use crate::common::Result;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub struct TaskGroup {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            name: name.into(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Has shutdown been requested?
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of tasks that have not finished yet
    pub fn active_tasks(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .count()
    }

    /// Run `tick` every `period`, first run one period after spawning.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_periodic<F>(&self, task: &str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        let label = format!("{}/{}", self.name, task);
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match catch_unwind(AssertUnwindSafe(&mut tick)) {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::warn!("Task {} run failed: {}", task_label, e),
                            Err(_) => tracing::error!("Task {} run panicked", task_label),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Task {} stopped", task_label);
        });

        self.push(label, handle);
    }

    /// Run `job` once after `delay` unless shutdown comes first.
    pub fn spawn_delayed<F>(&self, task: &str, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        let label = format!("{}/{}", self.name, task);
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("Task {} panicked", task_label);
                    }
                }
                _ = shutdown.changed() => {}
            }
        });

        self.push(label, handle);
    }

    fn push(&self, label: String, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((label, handle));
    }

    /// Signal every task and wait up to `grace` before aborting stragglers.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock());
        let deadline = Instant::now() + grace;

        for (label, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Task {} ended abnormally: {}", label, e),
                Err(_) => {
                    tracing::warn!("Task {} did not stop within {:?}, aborting", label, grace);
                    handle.abort();
                }
            }
        }
        tracing::info!("{} tasks stopped", self.name);
    }
}
