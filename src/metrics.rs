//! Metrics collection for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Relay metrics collector
#[derive(Debug)]
pub struct RelayMetrics {
    // Consumption loop metrics
    pub records_consumed: AtomicU64,
    pub consume_errors: AtomicU64,
    pub empty_polls: AtomicU64,

    // Broadcaster metrics
    pub broadcasts_delivered: AtomicU64,
    pub observers_registered: AtomicU64,
    pub observers_deregistered: AtomicU64,
    pub observers_lagged: AtomicU64,

    // Publisher metrics
    pub records_published: AtomicU64,
    pub publish_errors: AtomicU64,
    pub flush_timeouts: AtomicU64,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self {
            records_consumed: AtomicU64::new(0),
            consume_errors: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            broadcasts_delivered: AtomicU64::new(0),
            observers_registered: AtomicU64::new(0),
            observers_deregistered: AtomicU64::new(0),
            observers_lagged: AtomicU64::new(0),
            records_published: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            flush_timeouts: AtomicU64::new(0),
        }
    }
}

impl RelayMetrics {
    /// Record a successfully consumed record
    pub fn record_consumed(&self) {
        self.records_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a recoverable consume error
    pub fn record_consume_error(&self) {
        self.consume_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a poll that returned no record within its timeout
    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record deliveries of one message to `count` observers
    pub fn record_broadcast(&self, count: u64) {
        self.broadcasts_delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an observer registration
    pub fn record_observer_registered(&self) {
        self.observers_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an observer deregistration
    pub fn record_observer_deregistered(&self) {
        self.observers_deregistered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message dropped because an observer was not keeping up
    pub fn record_observer_lagged(&self) {
        self.observers_lagged.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful publish
    pub fn record_published(&self) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed publish
    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that exceeded its bound
    pub fn record_flush_timeout(&self) {
        self.flush_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_consumed: self.records_consumed.load(Ordering::Relaxed),
            consume_errors: self.consume_errors.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            broadcasts_delivered: self.broadcasts_delivered.load(Ordering::Relaxed),
            observers_registered: self.observers_registered.load(Ordering::Relaxed),
            observers_deregistered: self.observers_deregistered.load(Ordering::Relaxed),
            observers_lagged: self.observers_lagged.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            flush_timeouts: self.flush_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub records_consumed: u64,
    pub consume_errors: u64,
    pub empty_polls: u64,
    pub broadcasts_delivered: u64,
    pub observers_registered: u64,
    pub observers_deregistered: u64,
    pub observers_lagged: u64,
    pub records_published: u64,
    pub publish_errors: u64,
    pub flush_timeouts: u64,
}

/// Global metrics instance
static GLOBAL_METRICS: once_cell::sync::Lazy<Arc<RelayMetrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(RelayMetrics::default()));

/// Get the global metrics instance
pub fn global_metrics() -> Arc<RelayMetrics> {
    GLOBAL_METRICS.clone()
}
