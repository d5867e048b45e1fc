//! Serializable fleet snapshots

use crate::fault::FaultKind;
use crate::fleet::{FleetState, HaltReason};
use crate::models::IncidentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One service's active fault as seen in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFaultStatus {
    pub service: String,
    pub kind: FaultKind,
    pub elapsed_secs: Option<u64>,
    pub duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<IncidentId>,
}

/// Point-in-time view of the simulated fleet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub total_generated: u64,
    pub active_faults: Vec<ActiveFaultStatus>,
    pub services: usize,
    pub pods: usize,
    pub uptime_secs: u64,
    pub ticks: u64,
    pub halted: Option<HaltReason>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FleetStatus {
    pub fn capture(fleet: &FleetState, ticks: u64, now: DateTime<Utc>) -> Self {
        let active_faults = fleet
            .services()
            .iter()
            .filter_map(|service| {
                let kind = service.active_fault()?;
                Some(ActiveFaultStatus {
                    service: service.name().to_string(),
                    kind,
                    elapsed_secs: service.fault_elapsed(now).ok().flatten(),
                    duration_secs: service.fault().duration_secs(),
                    incident_id: service.fault().incident_id().cloned(),
                })
            })
            .collect();

        Self {
            total_generated: fleet.total_generated(),
            active_faults,
            services: fleet.len(),
            pods: fleet.pod_count(),
            uptime_secs: fleet.uptime(now).as_secs(),
            ticks,
            halted: fleet.halted(),
            updated_at: Some(now),
        }
    }
}
