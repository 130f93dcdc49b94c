//! Metrics collector for the registration pipeline
//!
//! Handles are registered once against the global `metrics` recorder; when no
//! recorder is installed every call is a no-op.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use registration_core::models::{CompletionStatus, ErrorCategory};
use tracing::debug;

pub struct MetricsCollector {
    aggregations_total: Counter,
    aggregations_incomplete: Counter,
    aggregation_duration: Histogram,
    failures_captured: Counter,
    retries_attempted: Counter,
    retries_succeeded: Counter,
    dead_letters_total: Counter,
    manual_retries_total: Counter,
    queue_depth: Gauge,
    sweep_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            aggregations_total: counter!("registration_aggregations_total"),
            aggregations_incomplete: counter!("registration_aggregations_incomplete_total"),
            aggregation_duration: histogram!("registration_aggregation_duration_seconds"),
            failures_captured: counter!("registration_failures_captured_total"),
            retries_attempted: counter!("registration_retries_attempted_total"),
            retries_succeeded: counter!("registration_retries_succeeded_total"),
            dead_letters_total: counter!("registration_dead_letters_total"),
            manual_retries_total: counter!("registration_manual_retries_total"),
            queue_depth: gauge!("registration_queue_depth"),
            sweep_duration: histogram!("registration_retry_sweep_duration_seconds"),
        }
    }

    /// Record an aggregation outcome
    pub fn record_aggregation(&self, status: CompletionStatus, duration_ms: u64) {
        self.aggregations_total.increment(1);
        if status != CompletionStatus::Complete {
            self.aggregations_incomplete.increment(1);
        }
        self.aggregation_duration.record(duration_ms as f64 / 1000.0);
        debug!(status = %status, duration_ms = duration_ms, "Aggregation recorded");
    }

    pub fn record_failure_captured(&self, category: ErrorCategory) {
        self.failures_captured.increment(1);
        debug!(category = %category, "Failure capture recorded");
    }

    pub fn record_retry(&self, succeeded: bool) {
        self.retries_attempted.increment(1);
        if succeeded {
            self.retries_succeeded.increment(1);
        }
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters_total.increment(1);
    }

    pub fn record_manual_retry(&self) {
        self.manual_retries_total.increment(1);
    }

    pub fn update_queue_depth(&self, depth: f64) {
        self.queue_depth.set(depth);
    }

    pub fn record_sweep_duration(&self, duration_seconds: f64) {
        self.sweep_duration.record(duration_seconds);
    }
}
