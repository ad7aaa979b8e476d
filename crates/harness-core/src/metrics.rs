//! Process-wide counters for bus traffic and domain launches.
//!
//! [`Harness::run`](crate::Harness::run) flushes them once when the bus
//! stream ends.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    messages_received: AtomicU64,
    events_accepted: AtomicU64,
    events_malformed: AtomicU64,
    launches_started: AtomicU64,
    launches_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            events_accepted: AtomicU64::new(0),
            events_malformed: AtomicU64::new(0),
            launches_started: AtomicU64::new(0),
            launches_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_accepted(&self) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_malformed(&self) {
        self.events_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_launches_started(&self) {
        self.launches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_launches_failed(&self) {
        self.launches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Log every counter in one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            event = "metrics.flush",
            messages_received = self.messages_received(),
            events_accepted = self.events_accepted(),
            events_malformed = self.events_malformed(),
            launches_started = self.launches_started(),
            launches_failed = self.launches_failed(),
        );
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn events_accepted(&self) -> u64 {
        self.events_accepted.load(Ordering::Relaxed)
    }

    pub fn events_malformed(&self) -> u64 {
        self.events_malformed.load(Ordering::Relaxed)
    }

    pub fn launches_started(&self) -> u64 {
        self.launches_started.load(Ordering::Relaxed)
    }

    pub fn launches_failed(&self) -> u64 {
        self.launches_failed.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.events_accepted.store(0, Ordering::Relaxed);
        self.events_malformed.store(0, Ordering::Relaxed);
        self.launches_started.store(0, Ordering::Relaxed);
        self.launches_failed.store(0, Ordering::Relaxed);
    }
}
