//! Boundary traits for the cluster data the engine consumes and the
//! status documents it produces

use crate::models::{
    NodeCapacity, PodUsage, Thresholds, UtilizationReport, DEFAULT_SCRAPE_INTERVAL_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read access to the cluster state sampled each pass
#[async_trait]
pub trait ClusterDataSource: Send + Sync {
    /// Allocatable capacity of every node
    async fn list_nodes(&self) -> Result<Vec<NodeCapacity>>;

    /// Current per-pod usage from the metrics API
    async fn list_pod_usage(&self) -> Result<Vec<PodUsage>>;

    /// Phase of every pod in the cluster
    async fn list_pod_phases(&self) -> Result<Vec<String>>;
}

/// Access to the monitored target objects
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets currently configured
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>>;

    /// Merge a report into the target's status
    async fn write_status(&self, target: &MonitoredTarget, report: &UtilizationReport)
        -> Result<()>;
}

/// Per-target configuration as declared on the target object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_seconds: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_scrape_interval() -> u64 {
    DEFAULT_SCRAPE_INTERVAL_SECS
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            scrape_interval_seconds: DEFAULT_SCRAPE_INTERVAL_SECS,
            thresholds: Thresholds::default(),
        }
    }
}

impl TargetSpec {
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_seconds)
    }
}

/// A monitored target and its configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredTarget {
    pub name: String,
    /// Namespace of the target object; `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub spec: TargetSpec,
}

impl MonitoredTarget {
    pub fn new(name: impl Into<String>, spec: TargetSpec) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            spec,
        }
    }

    /// Key under which history is kept
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: TargetSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.scrape_interval_seconds, 60);
        assert_eq!(spec.thresholds.cpu, 80.0);
        assert_eq!(spec.thresholds.memory, 85.0);
    }

    #[test]
    fn test_spec_partial_thresholds() {
        let spec: TargetSpec =
            serde_json::from_str(r#"{"scrapeIntervalSeconds": 30, "thresholds": {"cpu": 70}}"#)
                .unwrap();
        assert_eq!(spec.scrape_interval(), Duration::from_secs(30));
        assert_eq!(spec.thresholds.cpu, 70.0);
        assert_eq!(spec.thresholds.memory, 85.0);
    }

    #[test]
    fn test_target_key() {
        let mut target = MonitoredTarget::new("prod", TargetSpec::default());
        assert_eq!(target.key(), "prod");

        target.namespace = Some("monitoring".to_string());
        assert_eq!(target.key(), "monitoring/prod");
    }
}
