//! Utilization Operator - cluster utilization aggregation
//!
//! Runs as a single-replica Deployment, sampling node capacity and pod
//! usage for every ClusterUtilization object and writing the resulting
//! report into its status.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utilization_lib::{
    health::{components, HealthRegistry},
    CycleRunnerBuilder, EngineMetrics, HistoryStore, StructuredLogger,
};
use utilization_operator::{
    api,
    config::OperatorConfig,
    kube_source::{KubeClusterSource, KubeTargetStore},
};

const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting utilization-operator");

    let config = OperatorConfig::load()?;
    info!(
        tick_secs = config.tick_interval_secs,
        history_capacity = config.history_capacity,
        crd = %format!("{}.{}", config.crd_plural, config.crd_group),
        "Operator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::DATA_SOURCE).await;
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::STATUS_WRITER).await;

    let metrics = EngineMetrics::new();

    let logger = StructuredLogger::new("operator");
    logger.log_startup(OPERATOR_VERSION, config.history_capacity);

    // In-cluster config first, local kubeconfig otherwise
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let runner = CycleRunnerBuilder::new()
        .source(Arc::new(KubeClusterSource::new(client.clone())))
        .targets(Arc::new(KubeTargetStore::new(client, &config)))
        .history(Arc::new(HistoryStore::with_capacity(config.history_capacity)))
        .health(health_registry.clone())
        .tick_interval(config.tick_interval())
        .initial_delay(config.initial_delay())
        .build()?
        .with_logger(logger.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner_handle = tokio::spawn(runner.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => warn!(error = %e, "API server exited"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => warn!("API server exited"),
            }
            logger.log_shutdown("API server stopped");
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = runner_handle.await {
        warn!(error = %e, "Runner task failed");
    }

    info!("Shutting down");
    Ok(())
}
