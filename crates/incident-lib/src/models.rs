//! Core data models for the incident simulator

use crate::error::SimulationError;
use crate::fault::FaultKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a simulated service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Web,
    Worker,
    Search,
    Database,
    Cache,
    Queue,
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceCategory::Web => "web",
            ServiceCategory::Worker => "worker",
            ServiceCategory::Search => "search",
            ServiceCategory::Database => "database",
            ServiceCategory::Cache => "cache",
            ServiceCategory::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// Opaque handle for an incident record returned by the incident store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current fault on a service
///
/// Either no fault is set, or kind, start time and duration are all set.
/// Fleet definitions loaded from disk may violate this; the state machine
/// force-ends such faults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultState {
    #[serde(default)]
    kind: Option<FaultKind>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    duration_secs: u64,
    #[serde(default)]
    incident_id: Option<IncidentId>,
}

impl FaultState {
    pub fn kind(&self) -> Option<FaultKind> {
        self.kind
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Planned duration in seconds (0 when idle)
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn incident_id(&self) -> Option<&IncidentId> {
        self.incident_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.kind.is_some()
    }
}

fn default_base_cpu() -> u32 {
    20
}

fn default_base_memory() -> u32 {
    40
}

fn default_base_connections() -> u32 {
    10
}

/// A simulated service: baseline characteristics plus current fault state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    name: String,
    category: ServiceCategory,
    #[serde(default = "default_base_cpu")]
    base_cpu: u32,
    #[serde(default = "default_base_memory")]
    base_memory: u32,
    #[serde(default = "default_base_connections")]
    base_connections: u32,
    pods: Vec<String>,
    #[serde(default)]
    fault: FaultState,
}

impl ServiceProfile {
    pub fn new<P, S>(name: impl Into<String>, category: ServiceCategory, pods: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            category,
            base_cpu: default_base_cpu(),
            base_memory: default_base_memory(),
            base_connections: default_base_connections(),
            pods: pods.into_iter().map(Into::into).collect(),
            fault: FaultState::default(),
        }
    }

    /// Set baseline CPU and memory percentages
    pub fn with_baseline(mut self, cpu: u32, memory: u32) -> Self {
        self.base_cpu = cpu;
        self.base_memory = memory;
        self
    }

    /// Set baseline connection count
    pub fn with_connections(mut self, connections: u32) -> Self {
        self.base_connections = connections;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ServiceCategory {
        self.category
    }

    pub fn base_cpu(&self) -> u32 {
        self.base_cpu
    }

    pub fn base_memory(&self) -> u32 {
        self.base_memory
    }

    pub fn base_connections(&self) -> u32 {
        self.base_connections
    }

    pub fn pods(&self) -> &[String] {
        &self.pods
    }

    pub fn fault(&self) -> &FaultState {
        &self.fault
    }

    pub fn has_active_fault(&self) -> bool {
        self.fault.is_active()
    }

    pub fn active_fault(&self) -> Option<FaultKind> {
        self.fault.kind
    }

    /// Whole seconds since the current fault started
    ///
    /// Returns `Ok(None)` when no fault is active or the start time is missing,
    /// and an error when the start time lies in the future.
    pub fn fault_elapsed(&self, now: DateTime<Utc>) -> Result<Option<u64>, SimulationError> {
        if !self.fault.is_active() {
            return Ok(None);
        }
        let Some(started_at) = self.fault.started_at else {
            return Ok(None);
        };

        let elapsed = (now - started_at).num_seconds();
        if elapsed < 0 {
            return Err(SimulationError::ClockSkew {
                service: self.name.clone(),
                skew_secs: -elapsed,
            });
        }
        Ok(Some(elapsed as u64))
    }

    /// Start a fault. Any previous fault state is replaced.
    pub fn begin_fault(&mut self, kind: FaultKind, now: DateTime<Utc>, duration_secs: u64) {
        self.fault = FaultState {
            kind: Some(kind),
            started_at: Some(now),
            duration_secs,
            incident_id: None,
        };
    }

    /// Attach the incident record created for the current fault
    pub fn attach_incident(&mut self, incident_id: IncidentId) {
        if self.fault.is_active() {
            self.fault.incident_id = Some(incident_id);
        }
    }

    /// Clear the current fault, returning the state it had
    pub fn clear_fault(&mut self) -> FaultState {
        std::mem::take(&mut self.fault)
    }
}

#[cfg(test)]
impl FaultState {
    /// Fault with a kind but no start time, as a hand-edited fleet file might describe
    pub(crate) fn corrupted(kind: FaultKind) -> Self {
        Self {
            kind: Some(kind),
            started_at: None,
            duration_secs: 0,
            incident_id: None,
        }
    }
}

#[cfg(test)]
impl ServiceProfile {
    pub(crate) fn set_fault_state(&mut self, fault: FaultState) {
        self.fault = fault;
    }
}
