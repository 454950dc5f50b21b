//! Kubernetes-backed data source and target store
//!
//! Nodes and pods come from the core API, pod usage from
//! `metrics.k8s.io/v1beta1`, and targets are custom objects whose status
//! subresource receives each report as a merge patch.

use crate::config::OperatorConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, warn};
use utilization_lib::{
    ClusterDataSource, ContainerUsage, MonitoredTarget, NodeCapacity, PodUsage,
    ResourceQuantities, TargetSpec, TargetStore, UtilizationReport,
};

/// `metrics.k8s.io` pod metrics resource
pub fn pod_metrics_resource() -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".to_string(),
        version: "v1beta1".to_string(),
        api_version: "metrics.k8s.io/v1beta1".to_string(),
        kind: "PodMetrics".to_string(),
        plural: "pods".to_string(),
    }
}

/// Target custom resource described by the configuration
pub fn target_resource(config: &OperatorConfig) -> ApiResource {
    ApiResource {
        group: config.crd_group.clone(),
        version: config.crd_version.clone(),
        api_version: format!("{}/{}", config.crd_group, config.crd_version),
        kind: config.crd_kind.clone(),
        plural: config.crd_plural.clone(),
    }
}

/// Reads cluster state through the Kubernetes API
pub struct KubeClusterSource {
    client: Client,
}

impl KubeClusterSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterDataSource for KubeClusterSource {
    async fn list_nodes(&self) -> Result<Vec<NodeCapacity>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .context("Failed to list nodes")?;
        Ok(list.items.into_iter().map(node_capacity).collect())
    }

    async fn list_pod_usage(&self) -> Result<Vec<PodUsage>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &pod_metrics_resource());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list pod metrics")?;
        list.items.into_iter().map(pod_usage).collect()
    }

    async fn list_pod_phases(&self) -> Result<Vec<String>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default())
            .await
            .context("Failed to list pods")?;
        Ok(list.items.into_iter().map(pod_phase).collect())
    }
}

/// Allocatable cpu/memory of a node, with zero defaults for missing keys
pub fn node_capacity(node: Node) -> NodeCapacity {
    let allocatable = node
        .status
        .and_then(|status| status.allocatable)
        .unwrap_or_default();
    let defaults = ResourceQuantities::default();

    NodeCapacity {
        allocatable: ResourceQuantities {
            cpu: allocatable
                .get("cpu")
                .map(|q| q.0.clone())
                .unwrap_or(defaults.cpu),
            memory: allocatable
                .get("memory")
                .map(|q| q.0.clone())
                .unwrap_or(defaults.memory),
        },
    }
}

/// Usage record from a `PodMetrics` object
pub fn pod_usage(object: DynamicObject) -> Result<PodUsage> {
    let namespace = object
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let containers: Vec<ContainerUsage> = match object.data.get("containers") {
        Some(value) => serde_json::from_value(value.clone()).with_context(|| {
            format!(
                "Malformed containers in pod metrics {}/{}",
                namespace,
                object.metadata.name.as_deref().unwrap_or("<unnamed>")
            )
        })?,
        None => Vec::new(),
    };

    Ok(PodUsage {
        namespace,
        containers,
    })
}

pub fn pod_phase(pod: Pod) -> String {
    pod.status
        .and_then(|status| status.phase)
        .unwrap_or_default()
}

/// Reads targets from custom objects and writes reports to their status
pub struct KubeTargetStore {
    client: Client,
    resource: ApiResource,
    namespace: Option<String>,
}

impl KubeTargetStore {
    pub fn new(client: Client, config: &OperatorConfig) -> Self {
        Self {
            client,
            resource: target_resource(config),
            namespace: config.target_namespace.clone(),
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.resource),
            None => Api::all_with(self.client.clone(), &self.resource),
        }
    }
}

#[async_trait]
impl TargetStore for KubeTargetStore {
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let list = self
            .api(self.namespace.as_deref())
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {}", self.resource.plural))?;

        Ok(list.items.into_iter().filter_map(monitored_target).collect())
    }

    async fn write_status(
        &self,
        target: &MonitoredTarget,
        report: &UtilizationReport,
    ) -> Result<()> {
        let patch = json!({ "status": report });
        self.api(target.namespace.as_deref())
            .patch_status(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to patch status of {}", target.key()))?;

        debug!(target_name = %target.key(), "Status updated");
        Ok(())
    }
}

/// Target from a custom object; objects without a name are skipped
///
/// An unreadable spec falls back to defaults rather than dropping the target.
pub fn monitored_target(object: DynamicObject) -> Option<MonitoredTarget> {
    let name = object.metadata.name.clone()?;

    let spec = match object.data.get("spec") {
        Some(value) => serde_json::from_value::<TargetSpec>(value.clone()).unwrap_or_else(|e| {
            warn!(target_name = %name, error = %e, "Invalid target spec, using defaults");
            TargetSpec::default()
        }),
        None => TargetSpec::default(),
    };

    Some(MonitoredTarget {
        name,
        namespace: object.metadata.namespace.clone(),
        spec,
    })
}
