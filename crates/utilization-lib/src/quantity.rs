//! Resource quantity parsing
//!
//! Converts unit-suffixed quantity strings (`"250m"`, `"128Mi"`) into
//! cores and bytes. Exactly one suffix is tried per string; anything else
//! is parsed as a plain number.

use thiserror::Error;

/// Memory suffixes in match priority order
const MEMORY_UNITS: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("K", 1_000.0),
    ("M", 1_000_000.0),
    ("G", 1_000_000_000.0),
    ("T", 1_000_000_000_000.0),
];

/// A quantity string whose numeric part is not a number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} quantity {input:?}")]
pub struct QuantityError {
    pub kind: QuantityKind,
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    Cpu,
    Memory,
}

impl std::fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityKind::Cpu => write!(f, "cpu"),
            QuantityKind::Memory => write!(f, "memory"),
        }
    }
}

fn parse_number(literal: &str, kind: QuantityKind, input: &str) -> Result<f64, QuantityError> {
    literal.parse::<f64>().map_err(|_| QuantityError {
        kind,
        input: input.to_string(),
    })
}

/// Parse a CPU quantity into cores
///
/// `m` is milli-cores, `n` is nano-cores, no suffix is whole cores.
pub fn parse_cpu(s: &str) -> Result<f64, QuantityError> {
    if let Some(milli) = s.strip_suffix('m') {
        Ok(parse_number(milli, QuantityKind::Cpu, s)? / 1_000.0)
    } else if let Some(nano) = s.strip_suffix('n') {
        Ok(parse_number(nano, QuantityKind::Cpu, s)? / 1_000_000_000.0)
    } else {
        parse_number(s, QuantityKind::Cpu, s)
    }
}

/// Parse a memory quantity into bytes
///
/// Binary suffixes (`Ki`..`Ti`) are checked before decimal ones (`K`..`T`).
pub fn parse_memory(s: &str) -> Result<f64, QuantityError> {
    for (suffix, multiplier) in MEMORY_UNITS {
        if let Some(literal) = s.strip_suffix(suffix) {
            return Ok(parse_number(literal, QuantityKind::Memory, s)? * multiplier);
        }
    }
    parse_number(s, QuantityKind::Memory, s)
}
