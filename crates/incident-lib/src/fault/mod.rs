//! Fault pattern library
//!
//! This module provides:
//! - The closed set of simulated fault kinds and their severities
//! - Static fault patterns (duration range, start probability, eligible services)
//! - Pure telemetry generators, one per fault kind, plus normal operation

mod catalog;
mod generators;
mod telemetry;

#[cfg(test)]
mod tests;

pub use catalog::default_patterns;
pub use generators::{generate_normal, GeneratorFn, GeneratorTable, DEFAULT_NORMAL_LOG_PROBABILITY};
pub use telemetry::{LogLevel, LogLine, Metric, MetricKind, Observation, Telemetry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of simulated fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    MemoryLeak,
    CpuSpike,
    DatabaseSlow,
    NetworkLatency,
    DiskFull,
    ConnectionLeak,
    QueueBacklog,
    GcPressure,
    ErrorBurst,
}

impl FaultKind {
    /// All kinds in declaration order
    pub const ALL: [FaultKind; 9] = [
        FaultKind::MemoryLeak,
        FaultKind::CpuSpike,
        FaultKind::DatabaseSlow,
        FaultKind::NetworkLatency,
        FaultKind::DiskFull,
        FaultKind::ConnectionLeak,
        FaultKind::QueueBacklog,
        FaultKind::GcPressure,
        FaultKind::ErrorBurst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::MemoryLeak => "memory_leak",
            FaultKind::CpuSpike => "cpu_spike",
            FaultKind::DatabaseSlow => "database_slow",
            FaultKind::NetworkLatency => "network_latency",
            FaultKind::DiskFull => "disk_full",
            FaultKind::ConnectionLeak => "connection_leak",
            FaultKind::QueueBacklog => "queue_backlog",
            FaultKind::GcPressure => "gc_pressure",
            FaultKind::ErrorBurst => "error_burst",
        }
    }

    /// Human-readable title, e.g. "Memory Leak"
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }

    /// Severity attached to persisted incident records
    pub fn severity(&self) -> Severity {
        match self {
            FaultKind::DatabaseSlow | FaultKind::DiskFull => Severity::Critical,
            FaultKind::MemoryLeak
            | FaultKind::CpuSpike
            | FaultKind::ConnectionLeak
            | FaultKind::ErrorBurst => Severity::High,
            FaultKind::NetworkLatency | FaultKind::QueueBacklog | FaultKind::GcPressure => {
                Severity::Medium
            }
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known fault kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown fault kind: {0}")]
pub struct ParseFaultKindError(pub String);

impl FromStr for FaultKind {
    type Err = ParseFaultKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaultKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseFaultKindError(s.to_string()))
    }
}

/// Coarse priority label for persisted incidents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
        }
    }
}

/// Static configuration for one fault kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultPattern {
    pub kind: FaultKind,
    /// Inclusive duration range in seconds
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    /// Per-tick start probability
    pub probability: f64,
    /// Services this pattern may start on
    pub services: Vec<String>,
}

impl FaultPattern {
    pub fn new(
        kind: FaultKind,
        duration_secs: (u64, u64),
        probability: f64,
        services: &[&str],
    ) -> Self {
        Self {
            kind,
            min_duration_secs: duration_secs.0,
            max_duration_secs: duration_secs.1,
            probability,
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether the named service is eligible for this pattern
    pub fn applies_to(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }
}
