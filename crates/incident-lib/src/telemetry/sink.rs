//! Collaborator interfaces for simulated telemetry

use crate::error::SinkResult;
use crate::fault::{FaultKind, LogLevel, Severity};
use crate::models::IncidentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label set attached to a metric observation or log stream
pub type Labels = BTreeMap<String, String>;

/// In-process metric instruments scraped by external monitoring
pub trait MetricsSink: Send + Sync {
    fn record_gauge(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()>;

    fn record_histogram(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()>;
}

/// One structured log line on its way to the log sink and the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub service: String,
    pub pod: Option<String>,
    pub level: LogLevel,
    pub message: String,
    /// Extra stream labels (the pod label is added from `pod`)
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
    pub incident_id: Option<IncidentId>,
}

/// Remote log shipping
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn push_log(&self, entry: &LogEntry) -> SinkResult<()>;
}

/// Lifecycle status of a persisted incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
    /// The fault was reset by a processing error rather than running its course
    Aborted,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident record created when a fault starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub kind: FaultKind,
    pub service: String,
    pub severity: Severity,
    pub description: String,
    pub affected_pods: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl NewIncident {
    pub fn new(
        kind: FaultKind,
        service: impl Into<String>,
        affected_pods: Vec<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let service = service.into();
        Self {
            kind,
            severity: kind.severity(),
            description: format!("{} detected in {}", kind.title(), service),
            service,
            affected_pods,
            started_at,
        }
    }
}

/// One persisted metric data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub service: String,
    pub pod: String,
    pub metric: String,
    pub value: f64,
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
    pub incident_id: Option<IncidentId>,
}

/// Persistence for incidents, metrics and logs (write side only)
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create_incident(&self, incident: &NewIncident) -> SinkResult<IncidentId>;

    async fn update_incident_status(
        &self,
        id: &IncidentId,
        status: IncidentStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> SinkResult<()>;

    async fn insert_metric(&self, record: &MetricRecord) -> SinkResult<()>;

    async fn insert_log(&self, entry: &LogEntry) -> SinkResult<()>;

    /// Release connections; called once at shutdown
    async fn close(&self) {}
}
