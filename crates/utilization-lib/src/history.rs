//! Bounded per-target utilization history
//!
//! Each target owns a FIFO window of recent samples. Windows are created on
//! the first append and live for the rest of the process. Capacity is
//! enforced on every append by evicting from the head.

use crate::models::Sample;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Default number of samples retained per target
pub const DEFAULT_CAPACITY: usize = 100;

/// Which series to read from a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Cpu,
    Memory,
}

impl Field {
    fn of(self, sample: &Sample) -> f64 {
        match self {
            Field::Cpu => sample.cpu_percent,
            Field::Memory => sample.mem_percent,
        }
    }
}

/// Both series of a window, captured at one instant, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
}

/// Per-target sample history
///
/// Access to a single target's window is serialized by the map's shard
/// lock, so `record` appends and snapshots without any other writer
/// interleaving.
#[derive(Debug)]
pub struct HistoryStore {
    windows: DashMap<String, VecDeque<Sample>>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store retaining `capacity` samples per target (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample to the tail of the target's window
    pub fn append(&self, target: &str, sample: Sample) {
        let mut window = self.windows.entry(target.to_string()).or_default();
        Self::push_bounded(&mut window, sample, self.capacity);
    }

    /// Append a sample and return the resulting window in one locked step
    pub fn record(&self, target: &str, sample: Sample) -> Window {
        let mut window = self.windows.entry(target.to_string()).or_default();
        Self::push_bounded(&mut window, sample, self.capacity);
        Window {
            cpu: window.iter().map(|s| Field::Cpu.of(s)).collect(),
            memory: window.iter().map(|s| Field::Memory.of(s)).collect(),
        }
    }

    /// Values of one series for a target, oldest first
    ///
    /// Unknown targets yield an empty sequence.
    pub fn values(&self, target: &str, field: Field) -> Vec<f64> {
        self.windows
            .get(target)
            .map(|window| window.iter().map(|s| field.of(s)).collect())
            .unwrap_or_default()
    }

    /// Number of samples currently held for a target
    pub fn len(&self, target: &str) -> usize {
        self.windows.get(target).map(|w| w.len()).unwrap_or(0)
    }

    /// Targets with at least one sample
    pub fn targets(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    fn push_bounded(window: &mut VecDeque<Sample>, sample: Sample, capacity: usize) {
        window.push_back(sample);
        while window.len() > capacity {
            window.pop_front();
        }
    }
}
