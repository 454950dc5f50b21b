//! Operator configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use utilization_lib::history::DEFAULT_CAPACITY;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "UTILIZATION_CONFIG";

/// Prefix for environment overrides (`UTILIZATION_API_PORT`, ...)
pub const ENV_PREFIX: &str = "UTILIZATION";

/// Operator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// How often targets are checked for a due pass, in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Delay before the first pass, in seconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Samples kept per target
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Restrict target discovery to one namespace
    #[serde(default)]
    pub target_namespace: Option<String>,

    #[serde(default = "default_crd_group")]
    pub crd_group: String,

    #[serde(default = "default_crd_version")]
    pub crd_version: String,

    #[serde(default = "default_crd_kind")]
    pub crd_kind: String,

    #[serde(default = "default_crd_plural")]
    pub crd_plural: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_tick_interval() -> u64 {
    60
}

fn default_initial_delay() -> u64 {
    5
}

fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_crd_group() -> String {
    "monitoring.kuberic.io".to_string()
}

fn default_crd_version() -> String {
    "v1".to_string()
}

fn default_crd_kind() -> String {
    "ClusterUtilization".to_string()
}

fn default_crd_plural() -> String {
    "clusterutilizations".to_string()
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            tick_interval_secs: default_tick_interval(),
            initial_delay_secs: default_initial_delay(),
            history_capacity: default_history_capacity(),
            target_namespace: None,
            crd_group: default_crd_group(),
            crd_version: default_crd_version(),
            crd_kind: default_crd_kind(),
            crd_plural: default_crd_plural(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(file.as_deref().map(Path::new))
    }

    /// Load configuration from `file` (if any), overridden by environment
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read operator configuration")?;

        config
            .try_deserialize()
            .context("Invalid operator configuration")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}
