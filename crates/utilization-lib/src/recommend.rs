//! Threshold-driven advisories

use crate::models::Thresholds;

/// Advisory messages for the measured utilization
///
/// A message is produced only when the measurement is strictly above its
/// threshold. CPU comes before memory.
pub fn recommend(
    cpu_pct: f64,
    cpu_threshold: f64,
    mem_pct: f64,
    mem_threshold: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if cpu_pct > cpu_threshold {
        recommendations.push(format!(
            "CPU usage ({:.1}%) exceeds threshold ({}%)",
            cpu_pct, cpu_threshold
        ));
    }
    if mem_pct > mem_threshold {
        recommendations.push(format!(
            "Memory usage ({:.1}%) exceeds threshold ({}%)",
            mem_pct, mem_threshold
        ));
    }
    recommendations
}

/// [`recommend`] against a target's configured thresholds
pub fn recommend_for(cpu_pct: f64, mem_pct: f64, thresholds: &Thresholds) -> Vec<String> {
    recommend(cpu_pct, thresholds.cpu, mem_pct, thresholds.memory)
}
