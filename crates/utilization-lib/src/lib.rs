//! Cluster utilization aggregation and recommendation engine
//!
//! This crate provides:
//! - Quantity parsing for cpu and memory resource strings
//! - Bounded per-target utilization history
//! - Nearest-rank percentiles and namespace usage ranking
//! - Threshold-based recommendations
//! - The aggregation pass and the periodic runner that drives it
//! - Health checks and observability

pub mod cycle;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod ranking;
pub mod recommend;
pub mod runner;
pub mod source;
pub mod stats;

pub use cycle::{AggregationCycle, ClusterTotals, CycleError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{Field, HistoryStore, Window};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use quantity::{parse_cpu, parse_memory, QuantityError};
pub use runner::{CycleRunner, CycleRunnerBuilder, PassOutcome, RunnerConfig};
pub use source::{ClusterDataSource, MonitoredTarget, TargetSpec, TargetStore};
