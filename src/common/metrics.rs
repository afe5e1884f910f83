//! Lightweight metric primitives
//!
//! Counters are lock-free and shared across threads. The
//! [`MetricWriter`] renders them in the Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Replace the value wholesale (snapshot restore)
    pub fn reset_to(&self, n: u64) {
        self.value.store(n, Ordering::Relaxed);
    }
}

/// Prometheus text-format builder
#[derive(Debug, Default)]
pub struct MetricWriter {
    out: String,
}

impl MetricWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit HELP/TYPE header followed by one unlabelled sample
    pub fn sample(&mut self, name: &str, kind: &str, help: &str, value: u64) {
        self.header(name, kind, help);
        let _ = writeln!(self.out, "{} {}", name, value);
    }

    pub fn header(&mut self, name: &str, kind: &str, help: &str) {
        let _ = writeln!(self.out, "# HELP {} {}", name, help);
        let _ = writeln!(self.out, "# TYPE {} {}", name, kind);
    }

    /// Labelled sample; call [`MetricWriter::header`] first
    pub fn labelled(&mut self, name: &str, label: &str, label_value: &str, value: u64) {
        let _ = writeln!(self.out, "{}{{{}=\"{}\"}} {}", name, label, label_value, value);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();

        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
        counter.reset_to(2);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_writer_format() {
        let mut w = MetricWriter::new();
        w.sample("sensorkv_messages_total", "counter", "Messages routed", 4);
        w.header("sensorkv_receiver_conflicts", "counter", "Conflicts per receiver");
        w.labelled("sensorkv_receiver_conflicts", "receiver", "r1", 2);
        let text = w.finish();
        assert!(text.contains("# TYPE sensorkv_messages_total counter\n"));
        assert!(text.contains("sensorkv_messages_total 4\n"));
        assert!(text.contains("sensorkv_receiver_conflicts{receiver=\"r1\"} 2\n"));
    }
}
