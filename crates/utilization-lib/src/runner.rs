//! Periodic driver for aggregation passes
//!
//! Each tick lists the monitored targets, and for every target whose scrape
//! interval has elapsed fetches a fresh snapshot, runs one aggregation pass
//! and writes the report back. Targets are processed one after another, so
//! two passes for the same target never overlap.

use crate::cycle::AggregationCycle;
use crate::health::{components, HealthRegistry};
use crate::history::HistoryStore;
use crate::models::{ClusterSnapshot, UsageSource, UtilizationReport};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::source::{ClusterDataSource, MonitoredTarget, TargetStore};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the runner loop
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often targets are checked for a due pass (default: 60 seconds)
    pub tick_interval: Duration,
    /// Delay before the first tick (default: 5 seconds)
    pub initial_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// What happened to one target on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Scrape interval has not elapsed yet
    NotDue,
    /// Report produced; `status_written` is false if the write failed
    Reported {
        report: UtilizationReport,
        status_written: bool,
    },
    /// No report this tick; history untouched
    Aborted { stage: &'static str, error: String },
}

/// Drives aggregation passes for every monitored target
pub struct CycleRunner {
    source: Arc<dyn ClusterDataSource>,
    targets: Arc<dyn TargetStore>,
    cycle: AggregationCycle,
    config: RunnerConfig,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    last_run: HashMap<String, Instant>,
}

impl CycleRunner {
    pub fn new(
        source: Arc<dyn ClusterDataSource>,
        targets: Arc<dyn TargetStore>,
        history: Arc<HistoryStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            source,
            targets,
            cycle: AggregationCycle::new(history),
            config,
            health: HealthRegistry::new(),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("runner"),
            last_run: HashMap::new(),
        }
    }

    /// Report component health into a shared registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        self.cycle.history()
    }

    /// Run until a shutdown signal is received
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            tick_secs = self.config.tick_interval.as_secs(),
            initial_delay_secs = self.config.initial_delay.as_secs(),
            "Starting utilization runner"
        );

        let start = Instant::now() + self.config.initial_delay;
        let mut ticker = interval_at(start, self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                scheduled = ticker.tick() => {
                    if let Err(e) = self.tick_at(scheduled).await {
                        warn!(error = %e, "Failed to list monitored targets");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down utilization runner");
                    break;
                }
            }
        }
    }

    /// Run every due target once, measured from the current instant
    pub async fn tick(&mut self) -> Result<Vec<(String, PassOutcome)>> {
        self.tick_at(Instant::now()).await
    }

    /// Run every due target once, measured from the tick's scheduled instant
    ///
    /// Every target on this tick is compared against the same `now`, so
    /// listing and pass latency never push a target past its interval.
    pub async fn tick_at(&mut self, now: Instant) -> Result<Vec<(String, PassOutcome)>> {
        let targets = self.targets.list_targets().await?;
        self.metrics.set_targets_monitored(targets.len() as i64);

        let current: HashSet<String> = targets.iter().map(MonitoredTarget::key).collect();
        self.last_run.retain(|key, _| current.contains(key));

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            if !self.is_due(&target, now) {
                outcomes.push((target.key(), PassOutcome::NotDue));
                continue;
            }
            self.last_run.insert(target.key(), now);
            let outcome = self.run_target(&target).await;
            outcomes.push((target.key(), outcome));
        }

        Ok(outcomes)
    }

    fn is_due(&self, target: &MonitoredTarget, now: Instant) -> bool {
        match self.last_run.get(&target.key()) {
            Some(last) => now.duration_since(*last) >= target.spec.scrape_interval(),
            None => true,
        }
    }

    /// Fetch, aggregate and publish for a single target
    pub async fn run_target(&self, target: &MonitoredTarget) -> PassOutcome {
        let started = Instant::now();
        let key = target.key();

        let snapshot = match self.fetch_snapshot(&key).await {
            Ok(snapshot) => snapshot,
            Err((stage, e)) => {
                let error = format!("{:#}", e);
                self.health
                    .set_unhealthy(components::DATA_SOURCE, format!("{}: {}", stage, error))
                    .await;
                return self.abort(&key, stage, error);
            }
        };

        let report = match self.cycle.run(&key, &snapshot, &target.spec.thresholds) {
            Ok(report) => report,
            Err(e) => {
                self.health
                    .set_degraded(components::ENGINE, e.to_string())
                    .await;
                return self.abort(&key, "aggregate", e.to_string());
            }
        };
        self.health.set_healthy(components::ENGINE).await;

        self.logger.log_cycle(
            &key,
            report.summary.cpu_percent,
            report.percentiles.cpu.p90,
            report.summary.memory_percent,
            report.saturation.pending_pods,
        );
        for message in &report.recommendations {
            self.logger.log_recommendation(&key, message);
        }

        let status_written = match self.targets.write_status(target, &report).await {
            Ok(()) => {
                self.health.set_healthy(components::STATUS_WRITER).await;
                true
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger.log_status_write_failed(&key, &error);
                self.metrics.inc_status_write_errors();
                self.health
                    .set_degraded(components::STATUS_WRITER, error)
                    .await;
                false
            }
        };

        self.metrics.inc_cycles_completed();
        self.metrics.set_utilization(
            &key,
            report.summary.cpu_percent,
            report.summary.memory_percent,
        );
        self.metrics
            .observe_cycle_latency(started.elapsed().as_secs_f64());
        self.health.mark_report().await;

        debug!(target_name = %key, status_written, "Pass finished");
        PassOutcome::Reported {
            report,
            status_written,
        }
    }

    /// Gather nodes, pod usage and pod phases
    ///
    /// Missing pod usage degrades the pass instead of failing it.
    async fn fetch_snapshot(
        &self,
        key: &str,
    ) -> std::result::Result<ClusterSnapshot, (&'static str, anyhow::Error)> {
        let nodes = self
            .source
            .list_nodes()
            .await
            .map_err(|e| ("list_nodes", e))?;

        let pod_usage = match self.source.list_pod_usage().await {
            Ok(pods) => UsageSource::Available(pods),
            Err(e) => {
                let reason = format!("{:#}", e);
                self.logger.log_source_unavailable(key, &reason);
                self.metrics.inc_usage_source_unavailable();
                UsageSource::Unavailable(reason)
            }
        };

        let pod_phases = self
            .source
            .list_pod_phases()
            .await
            .map_err(|e| ("list_pod_phases", e))?;

        match &pod_usage {
            UsageSource::Available(_) => self.health.set_healthy(components::DATA_SOURCE).await,
            UsageSource::Unavailable(reason) => {
                self.health
                    .set_degraded(components::DATA_SOURCE, reason.clone())
                    .await
            }
        }

        Ok(ClusterSnapshot {
            nodes,
            pod_usage,
            pod_phases,
        })
    }

    fn abort(&self, key: &str, stage: &'static str, error: String) -> PassOutcome {
        self.logger.log_cycle_aborted(key, stage, &error);
        self.metrics.inc_cycles_failed();
        PassOutcome::Aborted { stage, error }
    }
}

/// Builder for the runner
pub struct CycleRunnerBuilder {
    source: Option<Arc<dyn ClusterDataSource>>,
    targets: Option<Arc<dyn TargetStore>>,
    history: Option<Arc<HistoryStore>>,
    health: Option<HealthRegistry>,
    config: RunnerConfig,
}

impl CycleRunnerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            targets: None,
            history: None,
            health: None,
            config: RunnerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ClusterDataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn targets(mut self, targets: Arc<dyn TargetStore>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn build(self) -> Result<CycleRunner> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Data source is required"))?;
        let targets = self
            .targets
            .ok_or_else(|| anyhow::anyhow!("Target store is required"))?;
        let history = self.history.unwrap_or_default();

        let runner = CycleRunner::new(source, targets, history, self.config);
        Ok(match self.health {
            Some(health) => runner.with_health(health),
            None => runner,
        })
    }
}

impl Default for CycleRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::history::Field;
    use crate::models::{NodeCapacity, PodUsage, Thresholds};
    use crate::source::TargetSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    /// Mock cluster with a fixed node pool and adjustable usage
    struct MockCluster {
        node_cpu: &'static str,
        used_cpu: Mutex<Vec<&'static str>>,
        usage_available: AtomicBool,
        nodes_available: AtomicBool,
    }

    impl MockCluster {
        fn new(node_cpu: &'static str, used_cpu: Vec<&'static str>) -> Self {
            Self {
                node_cpu,
                used_cpu: Mutex::new(used_cpu),
                usage_available: AtomicBool::new(true),
                nodes_available: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ClusterDataSource for MockCluster {
        async fn list_nodes(&self) -> Result<Vec<NodeCapacity>> {
            if !self.nodes_available.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(vec![NodeCapacity::new(self.node_cpu, "16Gi")])
        }

        async fn list_pod_usage(&self) -> Result<Vec<PodUsage>> {
            if !self.usage_available.load(Ordering::SeqCst) {
                anyhow::bail!("the server could not find the requested resource");
            }
            let used = self.used_cpu.lock().unwrap();
            Ok(used
                .iter()
                .map(|cpu| PodUsage::new("default", &[(*cpu, "1Gi")]))
                .collect())
        }

        async fn list_pod_phases(&self) -> Result<Vec<String>> {
            Ok(vec!["Running".to_string(), "Pending".to_string()])
        }
    }

    /// Mock target store that records written reports
    struct MockTargets {
        targets: Mutex<Vec<MonitoredTarget>>,
        list_delays: Mutex<Vec<Duration>>,
        written: Mutex<Vec<(String, UtilizationReport)>>,
        fail_writes: AtomicBool,
        list_calls: AtomicUsize,
    }

    impl MockTargets {
        fn single(spec: TargetSpec) -> Self {
            Self {
                targets: Mutex::new(vec![MonitoredTarget::new("cluster", spec)]),
                list_delays: Mutex::new(Vec::new()),
                written: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TargetStore for MockTargets {
        async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.list_delays.lock().unwrap().pop();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.targets.lock().unwrap().clone())
        }

        async fn write_status(
            &self,
            target: &MonitoredTarget,
            report: &UtilizationReport,
        ) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("conflict");
            }
            self.written
                .lock()
                .unwrap()
                .push((target.name.clone(), report.clone()));
            Ok(())
        }
    }

    fn runner(cluster: Arc<MockCluster>, targets: Arc<MockTargets>) -> CycleRunner {
        CycleRunnerBuilder::new()
            .source(cluster)
            .targets(targets)
            .build()
            .unwrap()
    }

    fn always_due() -> TargetSpec {
        TargetSpec {
            scrape_interval_seconds: 0,
            thresholds: Thresholds::default(),
        }
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_requires_source() {
        let targets = Arc::new(MockTargets::single(TargetSpec::default()));
        let result = CycleRunnerBuilder::new().targets(targets).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tick_writes_report() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1", "1"]));
        let targets = Arc::new(MockTargets::single(TargetSpec::default()));
        let mut runner = runner(cluster, targets.clone());

        let outcomes = assert_ok!(runner.tick().await);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0].1 {
            PassOutcome::Reported {
                report,
                status_written,
            } => {
                assert!(status_written);
                assert_eq!(report.summary.cpu_percent, 20.0);
                assert_eq!(report.summary.memory_percent, 12.5);
                assert_eq!(report.saturation.pending_pods, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let written = targets.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "cluster");
    }

    #[tokio::test]
    async fn test_scrape_interval_is_honoured() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1"]));
        let targets = Arc::new(MockTargets::single(TargetSpec::default()));
        let mut runner = runner(cluster, targets.clone());

        runner.tick().await.unwrap();
        let outcomes = runner.tick().await.unwrap();

        assert_eq!(outcomes[0].1, PassOutcome::NotDue);
        assert_eq!(targets.written.lock().unwrap().len(), 1);
        assert_eq!(targets.list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.history().len("cluster"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_latency_does_not_skip_due_target() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1"]));
        let targets = Arc::new(MockTargets::single(TargetSpec {
            scrape_interval_seconds: 1,
            thresholds: Thresholds::default(),
        }));
        // Slow listing on the first tick only
        targets
            .list_delays
            .lock()
            .unwrap()
            .push(Duration::from_millis(300));
        let mut runner = runner(cluster, targets.clone());

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut not_due = Vec::new();
        for _ in 0..3 {
            let scheduled = ticker.tick().await;
            let outcomes = runner.tick_at(scheduled).await.unwrap();
            not_due.push(outcomes[0].1 == PassOutcome::NotDue);
        }

        assert_eq!(not_due, vec![false, false, false]);
        assert_eq!(runner.history().len("cluster"), 3);
        assert_eq!(targets.written.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_removed_targets_are_forgotten() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1"]));
        let targets = Arc::new(MockTargets::single(TargetSpec::default()));
        targets
            .targets
            .lock()
            .unwrap()
            .push(MonitoredTarget::new("staging", TargetSpec::default()));
        let mut runner = runner(cluster, targets.clone());

        runner.tick().await.unwrap();
        assert_eq!(runner.last_run.len(), 2);

        targets.targets.lock().unwrap().retain(|t| t.name != "staging");
        runner.tick().await.unwrap();

        assert_eq!(runner.last_run.len(), 1);
        assert!(runner.last_run.contains_key("cluster"));
    }

    #[tokio::test]
    async fn test_unavailable_usage_degrades_but_reports() {
        let cluster = Arc::new(MockCluster::new("10", vec!["5"]));
        cluster.usage_available.store(false, Ordering::SeqCst);
        let targets = Arc::new(MockTargets::single(always_due()));
        let health = HealthRegistry::new();
        let mut runner = CycleRunnerBuilder::new()
            .source(cluster)
            .targets(targets.clone())
            .health(health.clone())
            .build()
            .unwrap();

        let outcomes = runner.tick().await.unwrap();
        match &outcomes[0].1 {
            PassOutcome::Reported { report, .. } => {
                assert_eq!(report.summary.cpu_percent, 0.0);
                assert!(report.top_namespaces.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let status = health.health().await;
        assert_eq!(
            status.components[components::DATA_SOURCE].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_unreachable_nodes_abort_pass() {
        let cluster = Arc::new(MockCluster::new("10", vec!["5"]));
        cluster.nodes_available.store(false, Ordering::SeqCst);
        let targets = Arc::new(MockTargets::single(always_due()));
        let health = HealthRegistry::new();
        let mut runner = CycleRunnerBuilder::new()
            .source(cluster)
            .targets(targets.clone())
            .health(health.clone())
            .build()
            .unwrap();

        let outcomes = runner.tick().await.unwrap();
        assert!(matches!(
            outcomes[0].1,
            PassOutcome::Aborted {
                stage: "list_nodes",
                ..
            }
        ));
        assert_eq!(runner.history().len("cluster"), 0);
        assert!(targets.written.lock().unwrap().is_empty());
        assert!(runner.metrics.cycles_failed() > 0);
        assert_eq!(health.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_malformed_usage_aborts_without_history() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1", "lots"]));
        let targets = Arc::new(MockTargets::single(always_due()));
        let mut runner = runner(cluster, targets.clone());

        let outcomes = runner.tick().await.unwrap();
        assert!(matches!(
            outcomes[0].1,
            PassOutcome::Aborted {
                stage: "aggregate",
                ..
            }
        ));
        assert_eq!(runner.history().len("cluster"), 0);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_history() {
        let cluster = Arc::new(MockCluster::new("10", vec!["9"]));
        let targets = Arc::new(MockTargets::single(always_due()));
        targets.fail_writes.store(true, Ordering::SeqCst);
        let mut runner = runner(cluster, targets.clone());

        let outcomes = runner.tick().await.unwrap();
        match &outcomes[0].1 {
            PassOutcome::Reported {
                report,
                status_written,
            } => {
                assert!(!status_written);
                assert_eq!(report.recommendations.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(runner.history().len("cluster"), 1);
    }

    #[tokio::test]
    async fn test_history_accumulates_across_ticks() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1"]));
        let targets = Arc::new(MockTargets::single(always_due()));
        let mut runner = runner(cluster.clone(), targets);

        for used in ["1", "2", "3", "4", "5"] {
            *cluster.used_cpu.lock().unwrap() = vec![used];
            runner.tick().await.unwrap();
        }

        assert_eq!(
            runner.history().values("cluster", Field::Cpu),
            vec![10.0, 20.0, 30.0, 40.0, 50.0]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let cluster = Arc::new(MockCluster::new("10", vec!["1"]));
        let targets = Arc::new(MockTargets::single(TargetSpec::default()));
        let runner = CycleRunnerBuilder::new()
            .source(cluster)
            .targets(targets)
            .initial_delay(Duration::from_secs(3600))
            .build()
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(runner.run(rx));
        tx.send(()).unwrap();

        let joined = assert_ok!(tokio::time::timeout(Duration::from_secs(5), handle).await);
        assert!(joined.is_ok());
    }
}
