//! Cluster utilization operator
//!
//! Wires the utilization engine to a Kubernetes cluster: configuration,
//! API-backed data sources and the health/metrics HTTP endpoints.

pub mod api;
pub mod config;
pub mod kube_source;
