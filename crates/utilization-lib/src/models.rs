//! Core data models for the utilization engine
//!
//! Snapshot records mirror the shapes served by the cluster API (node
//! allocatable, `metrics.k8s.io` pod metrics). Report types serialize with
//! the camelCase field names expected in the target's status document.

use serde::{Deserialize, Serialize};

/// Default CPU threshold percentage
pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

/// Default memory threshold percentage
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 85.0;

/// Default scrape interval for a target, in seconds
pub const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 60;

fn default_cpu_quantity() -> String {
    "0".to_string()
}

fn default_memory_quantity() -> String {
    "0Ki".to_string()
}

fn default_namespace() -> String {
    "unknown".to_string()
}

/// Raw cpu/memory quantity pair, as found in `allocatable` and `usage` maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    #[serde(default = "default_cpu_quantity")]
    pub cpu: String,
    #[serde(default = "default_memory_quantity")]
    pub memory: String,
}

impl ResourceQuantities {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }
}

impl Default for ResourceQuantities {
    fn default() -> Self {
        Self {
            cpu: default_cpu_quantity(),
            memory: default_memory_quantity(),
        }
    }
}

/// Allocatable capacity of a single node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCapacity {
    #[serde(default)]
    pub allocatable: ResourceQuantities,
}

impl NodeCapacity {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            allocatable: ResourceQuantities::new(cpu, memory),
        }
    }
}

/// Usage reported for one container of a pod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    #[serde(default)]
    pub usage: ResourceQuantities,
}

/// Usage reported for one pod, attributed to its namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodUsage {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

impl PodUsage {
    /// Build a pod usage record from `(cpu, memory)` pairs, one per container
    pub fn new(namespace: impl Into<String>, containers: &[(&str, &str)]) -> Self {
        Self {
            namespace: namespace.into(),
            containers: containers
                .iter()
                .map(|(cpu, memory)| ContainerUsage {
                    usage: ResourceQuantities::new(*cpu, *memory),
                })
                .collect(),
        }
    }
}

/// Pod usage as delivered by the metrics source for one pass
#[derive(Debug, Clone, PartialEq)]
pub enum UsageSource {
    /// Usage records were retrieved
    Available(Vec<PodUsage>),
    /// The metrics source could not be reached; carries the reason
    Unavailable(String),
}

/// Everything one aggregation pass consumes
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeCapacity>,
    pub pod_usage: UsageSource,
    /// Pod phases across all namespaces (`Running`, `Pending`, ...)
    pub pod_phases: Vec<String>,
}

/// Percentage thresholds above which an advisory is emitted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_threshold")]
    pub cpu: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory: f64,
}

fn default_cpu_threshold() -> f64 {
    DEFAULT_CPU_THRESHOLD
}

fn default_memory_threshold() -> f64 {
    DEFAULT_MEMORY_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_CPU_THRESHOLD,
            memory: DEFAULT_MEMORY_THRESHOLD,
        }
    }
}

/// One utilization observation for a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

/// Current cluster-wide utilization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationSummary {
    pub cpu_percent: f64,
    #[serde(alias = "memPercent")]
    pub memory_percent: f64,
}

/// p50/p90/p95 over a history window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileReport {
    pub cpu: Percentiles,
    pub memory: Percentiles,
}

/// A namespace's share of current CPU usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceRank {
    pub namespace: String,
    pub cpu_millicores: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saturation {
    pub pending_pods: u64,
    /// Not detected yet; always 0
    pub unschedulable_pods: u64,
}

/// Result of one aggregation pass, merged into the target's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationReport {
    pub summary: UtilizationSummary,
    pub percentiles: PercentileReport,
    pub top_namespaces: Vec<NamespaceRank>,
    pub saturation: Saturation,
    pub timestamp: String,
    pub recommendations: Vec<String>,
}
