//! One aggregation pass: snapshot in, report out
//!
//! The pass normalizes every quantity first and only then touches the
//! history store, so a malformed record leaves history exactly as it was.

use crate::history::HistoryStore;
use crate::models::{
    ClusterSnapshot, PercentileReport, Percentiles, Sample, Saturation, Thresholds,
    UsageSource, UtilizationReport, UtilizationSummary,
};
use crate::quantity::{parse_cpu, parse_memory, QuantityError};
use crate::ranking::{top_n, NamespaceUsage, TOP_NAMESPACES};
use crate::recommend::recommend_for;
use crate::stats::round2;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Pod phase counted as pending saturation
const PENDING_PHASE: &str = "Pending";

/// Reasons an aggregation pass produced no report
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("malformed quantity in snapshot: {0}")]
    Quantity(#[from] QuantityError),
    #[error("unexpected failure during aggregation: {0}")]
    Unexpected(String),
}

/// Normalized totals for one snapshot
#[derive(Debug, Clone, Default)]
pub struct ClusterTotals {
    pub allocatable_cpu_cores: f64,
    pub allocatable_memory_bytes: f64,
    pub used_cpu_cores: f64,
    pub used_memory_bytes: f64,
    pub namespaces: NamespaceUsage,
}

impl ClusterTotals {
    /// Parse and sum every quantity in the snapshot
    ///
    /// Unavailable pod usage contributes nothing; it is not an error.
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Result<Self, CycleError> {
        let mut totals = ClusterTotals::default();

        for node in &snapshot.nodes {
            totals.allocatable_cpu_cores += parse_cpu(&node.allocatable.cpu)?;
            totals.allocatable_memory_bytes += parse_memory(&node.allocatable.memory)?;
        }

        match &snapshot.pod_usage {
            UsageSource::Available(pods) => {
                for pod in pods {
                    for container in &pod.containers {
                        let cpu = parse_cpu(&container.usage.cpu)?;
                        let memory = parse_memory(&container.usage.memory)?;
                        totals.used_cpu_cores += cpu;
                        totals.used_memory_bytes += memory;
                        totals.namespaces.add(&pod.namespace, cpu);
                    }
                }
            }
            UsageSource::Unavailable(reason) => {
                warn!(reason = %reason, "Pod usage unavailable, reporting zero usage");
            }
        }

        totals.ensure_finite()?;
        Ok(totals)
    }

    fn ensure_finite(&self) -> Result<(), CycleError> {
        let sums = [
            ("allocatable cpu", self.allocatable_cpu_cores),
            ("allocatable memory", self.allocatable_memory_bytes),
            ("used cpu", self.used_cpu_cores),
            ("used memory", self.used_memory_bytes),
        ];
        for (name, value) in sums {
            if !value.is_finite() {
                return Err(CycleError::Unexpected(format!("{} total is {}", name, value)));
            }
        }
        Ok(())
    }

    pub fn cpu_percent(&self) -> f64 {
        ratio_percent(self.used_cpu_cores, self.allocatable_cpu_cores)
    }

    pub fn memory_percent(&self) -> f64 {
        ratio_percent(self.used_memory_bytes, self.allocatable_memory_bytes)
    }
}

fn ratio_percent(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}

/// Runs aggregation passes against a shared history store
#[derive(Debug, Clone)]
pub struct AggregationCycle {
    history: Arc<HistoryStore>,
}

impl AggregationCycle {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Run a pass stamped with the current time
    pub fn run(
        &self,
        target: &str,
        snapshot: &ClusterSnapshot,
        thresholds: &Thresholds,
    ) -> Result<UtilizationReport, CycleError> {
        self.run_at(target, snapshot, thresholds, Utc::now())
    }

    /// Run a pass stamped with `now`
    pub fn run_at(
        &self,
        target: &str,
        snapshot: &ClusterSnapshot,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Result<UtilizationReport, CycleError> {
        let totals = ClusterTotals::from_snapshot(snapshot)?;

        let cpu_percent = totals.cpu_percent();
        let memory_percent = totals.memory_percent();

        let window = self.history.record(
            target,
            Sample {
                cpu_percent,
                mem_percent: memory_percent,
            },
        );
        let cpu = Percentiles::from_values(&window.cpu);
        let memory = Percentiles::from_values(&window.memory);

        let pending_pods = snapshot
            .pod_phases
            .iter()
            .filter(|phase| phase.as_str() == PENDING_PHASE)
            .count() as u64;

        debug!(
            target_name = %target,
            window = window.cpu.len(),
            namespaces = totals.namespaces.len(),
            "Aggregation pass computed"
        );

        Ok(UtilizationReport {
            summary: UtilizationSummary {
                cpu_percent: round2(cpu_percent),
                memory_percent: round2(memory_percent),
            },
            percentiles: PercentileReport {
                cpu: cpu.rounded(),
                memory: memory.rounded(),
            },
            top_namespaces: top_n(&totals.namespaces, TOP_NAMESPACES),
            saturation: Saturation {
                pending_pods,
                unschedulable_pods: 0,
            },
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, false),
            recommendations: recommend_for(cpu_percent, memory_percent, thresholds),
        })
    }

    /// Run a pass, logging and swallowing any failure
    ///
    /// Returns `None` when the pass was aborted; history is unchanged then.
    pub fn try_run(
        &self,
        target: &str,
        snapshot: &ClusterSnapshot,
        thresholds: &Thresholds,
    ) -> Option<UtilizationReport> {
        match self.run(target, snapshot, thresholds) {
            Ok(report) => Some(report),
            Err(e) => {
                error!(target_name = %target, error = %e, "Aggregation pass aborted");
                None
            }
        }
    }
}
