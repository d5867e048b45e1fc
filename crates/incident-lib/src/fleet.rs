//! Fleet definition and per-run fleet state

use crate::error::FleetError;
use crate::fault::{default_patterns, FaultPattern};
use crate::models::{ServiceCategory, ServiceProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Why fault generation was disabled for the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    RuntimeLimit,
    FaultLimit,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::RuntimeLimit => write!(f, "runtime_limit"),
            HaltReason::FaultLimit => write!(f, "fault_limit"),
        }
    }
}

/// All services for one simulation run plus run-wide counters
#[derive(Debug, Clone)]
pub struct FleetState {
    services: Vec<ServiceProfile>,
    total_generated: u64,
    started_at: DateTime<Utc>,
    halted: Option<HaltReason>,
}

impl FleetState {
    pub fn new(services: Vec<ServiceProfile>, started_at: DateTime<Utc>) -> Self {
        Self {
            services,
            total_generated: 0,
            started_at,
            halted: None,
        }
    }

    pub fn services(&self) -> &[ServiceProfile] {
        &self.services
    }

    pub fn service(&self, index: usize) -> Option<&ServiceProfile> {
        self.services.get(index)
    }

    pub fn service_mut(&mut self, index: usize) -> Option<&mut ServiceProfile> {
        self.services.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn pod_count(&self) -> usize {
        self.services.iter().map(|s| s.pods().len()).sum()
    }

    /// Number of services with an active fault
    pub fn active_count(&self) -> usize {
        self.services.iter().filter(|s| s.has_active_fault()).count()
    }

    /// Total faults started since the run began
    pub fn total_generated(&self) -> u64 {
        self.total_generated
    }

    pub(crate) fn record_generated(&mut self) {
        self.total_generated += 1;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Run time so far (zero if `now` precedes the start)
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.halted
    }

    pub(crate) fn halt(&mut self, reason: HaltReason) {
        if self.halted.is_none() {
            self.halted = Some(reason);
        }
    }

    /// Fleet-wide reset: clears every fault, the counters and any halt
    pub fn reset(&mut self, now: DateTime<Utc>) {
        for service in &mut self.services {
            service.clear_fault();
        }
        self.total_generated = 0;
        self.halted = None;
        self.started_at = now;
    }
}

/// Longest duration a pattern may plan for (30 days)
pub const MAX_FAULT_DURATION_SECS: u64 = 30 * 24 * 3600;

/// Services and fault patterns making up a simulated fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetDefinition {
    pub services: Vec<ServiceProfile>,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<FaultPattern>,
}

impl FleetDefinition {
    /// The built-in seven-service fleet with the standard patterns
    pub fn builtin() -> Self {
        Self {
            services: default_services(),
            patterns: default_patterns(),
        }
    }

    /// Load and validate a JSON fleet definition
    pub fn load(path: &Path) -> Result<Self, FleetError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, FleetError> {
        let definition: FleetDefinition = serde_json::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check structural invariants
    ///
    /// Patterns naming services outside the fleet are kept but logged, since
    /// they simply never match.
    pub fn validate(&self) -> Result<(), FleetError> {
        let mut names = HashSet::new();
        for service in &self.services {
            if !names.insert(service.name()) {
                return Err(FleetError::DuplicateService(service.name().to_string()));
            }
            if service.pods().is_empty() {
                return Err(FleetError::NoPods(service.name().to_string()));
            }
        }

        for pattern in &self.patterns {
            if pattern.min_duration_secs > pattern.max_duration_secs {
                return Err(FleetError::InvalidDuration {
                    kind: pattern.kind.to_string(),
                    min: pattern.min_duration_secs,
                    max: pattern.max_duration_secs,
                });
            }
            if pattern.max_duration_secs > MAX_FAULT_DURATION_SECS {
                return Err(FleetError::DurationTooLong {
                    kind: pattern.kind.to_string(),
                    max: pattern.max_duration_secs,
                    limit: MAX_FAULT_DURATION_SECS,
                });
            }
            if !(0.0..=1.0).contains(&pattern.probability) {
                return Err(FleetError::InvalidProbability {
                    kind: pattern.kind.to_string(),
                    probability: pattern.probability,
                });
            }
            for name in &pattern.services {
                if !names.contains(name.as_str()) {
                    warn!(kind = %pattern.kind, service = %name, "Fault pattern names unknown service");
                }
            }
        }

        Ok(())
    }

    /// Split into the run state and the pattern list
    pub fn into_state(self, now: DateTime<Utc>) -> (FleetState, Vec<FaultPattern>) {
        (FleetState::new(self.services, now), self.patterns)
    }
}

/// Built-in services, in fleet iteration order
pub fn default_services() -> Vec<ServiceProfile> {
    vec![
        ServiceProfile::new("user-api", ServiceCategory::Web, ["user-api-1", "user-api-2"])
            .with_baseline(25, 45),
        ServiceProfile::new(
            "payment-service",
            ServiceCategory::Web,
            ["payment-1", "payment-2", "payment-3"],
        )
        .with_baseline(30, 50),
        ServiceProfile::new("order-processor", ServiceCategory::Worker, ["order-proc-1"])
            .with_baseline(40, 60),
        ServiceProfile::new("search-engine", ServiceCategory::Search, ["search-1", "search-2"])
            .with_baseline(35, 70),
        ServiceProfile::new("user-db", ServiceCategory::Database, ["user-db-1"])
            .with_baseline(50, 80)
            .with_connections(50),
        ServiceProfile::new("redis-cache", ServiceCategory::Cache, ["redis-1", "redis-2"])
            .with_baseline(15, 30),
        ServiceProfile::new("message-queue", ServiceCategory::Queue, ["mq-1"])
            .with_baseline(20, 35),
    ]
}
