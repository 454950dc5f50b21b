//! Observability infrastructure for the utilization engine
//!
//! Provides:
//! - Prometheus metrics (cycle latency, cycle outcomes, per-target utilization)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, Encoder,
    GaugeVec, Histogram, IntCounter, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for cycle latency (in seconds), including data retrieval
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    usage_source_unavailable: IntCounter,
    status_write_errors: IntCounter,
    targets_monitored: IntGauge,
    utilization_percent: GaugeVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "utilization_cycle_latency_seconds",
                "Time spent on one aggregation pass including data retrieval",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "utilization_cycles_completed_total",
                "Aggregation passes that produced a report"
            )
            .expect("Failed to register cycles_completed"),

            cycles_failed: register_int_counter!(
                "utilization_cycles_failed_total",
                "Aggregation passes aborted without a report"
            )
            .expect("Failed to register cycles_failed"),

            usage_source_unavailable: register_int_counter!(
                "utilization_usage_source_unavailable_total",
                "Passes run without pod usage because the metrics API was unavailable"
            )
            .expect("Failed to register usage_source_unavailable"),

            status_write_errors: register_int_counter!(
                "utilization_status_write_errors_total",
                "Reports that could not be written to the target status"
            )
            .expect("Failed to register status_write_errors"),

            targets_monitored: register_int_gauge!(
                "utilization_targets_monitored",
                "Number of targets seen on the last tick"
            )
            .expect("Failed to register targets_monitored"),

            utilization_percent: register_gauge_vec!(
                "utilization_percent",
                "Current utilization percentage per target and resource",
                &["target", "resource"]
            )
            .expect("Failed to register utilization_percent"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle; clones share the same global metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_completed(&self) {
        self.inner().cycles_completed.inc();
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    pub fn inc_usage_source_unavailable(&self) {
        self.inner().usage_source_unavailable.inc();
    }

    pub fn inc_status_write_errors(&self) {
        self.inner().status_write_errors.inc();
    }

    pub fn set_targets_monitored(&self, count: i64) {
        self.inner().targets_monitored.set(count);
    }

    /// Publish the latest cpu/memory percentages for a target
    pub fn set_utilization(&self, target: &str, cpu_percent: f64, memory_percent: f64) {
        let gauge = &self.inner().utilization_percent;
        gauge.with_label_values(&[target, "cpu"]).set(cpu_percent);
        gauge.with_label_values(&[target, "memory"]).set(memory_percent);
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode_text(&self) -> prometheus::Result<Vec<u8>> {
        self.inner();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.inner().cycles_completed.get()
    }

    pub fn cycles_failed(&self) -> u64 {
        self.inner().cycles_failed.get()
    }
}

/// Structured logger for engine events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Log a completed aggregation pass
    pub fn log_cycle(
        &self,
        target: &str,
        cpu_percent: f64,
        cpu_p90: f64,
        memory_percent: f64,
        pending_pods: u64,
    ) {
        info!(
            event = "cycle_completed",
            component = %self.component,
            target_name = %target,
            cpu_percent = cpu_percent,
            cpu_p90 = cpu_p90,
            memory_percent = memory_percent,
            pending_pods = pending_pods,
            "Utilization pass complete"
        );
    }

    pub fn log_recommendation(&self, target: &str, message: &str) {
        warn!(
            event = "recommendation_emitted",
            component = %self.component,
            target_name = %target,
            recommendation = %message,
            "Utilization threshold exceeded"
        );
    }

    pub fn log_source_unavailable(&self, target: &str, reason: &str) {
        warn!(
            event = "usage_source_unavailable",
            component = %self.component,
            target_name = %target,
            reason = %reason,
            "Metrics API unavailable, usage reported as zero"
        );
    }

    pub fn log_cycle_aborted(&self, target: &str, stage: &str, error: &str) {
        error!(
            event = "cycle_aborted",
            component = %self.component,
            target_name = %target,
            stage = %stage,
            error = %error,
            "Utilization pass aborted, no report this tick"
        );
    }

    pub fn log_status_write_failed(&self, target: &str, error: &str) {
        warn!(
            event = "status_write_failed",
            component = %self.component,
            target_name = %target,
            error = %error,
            "Failed to write utilization status"
        );
    }

    pub fn log_startup(&self, version: &str, history_capacity: usize) {
        info!(
            event = "operator_started",
            component = %self.component,
            version = %version,
            history_capacity = history_capacity,
            "Utilization operator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "operator_shutdown",
            component = %self.component,
            reason = %reason,
            "Utilization operator shutting down"
        );
    }
}
