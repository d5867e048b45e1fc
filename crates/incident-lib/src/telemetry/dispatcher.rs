//! Fault-tolerant fan-out to the telemetry collaborators
//!
//! Every collaborator call is bounded by a timeout. Failures are logged,
//! counted and reflected in component health, and never propagate: the
//! simulation keeps running whatever its collaborators do.

use super::sink::{
    IncidentStatus, IncidentStore, Labels, LogEntry, LogSink, MetricRecord, MetricsSink,
    NewIncident,
};
use crate::error::{SinkError, SinkResult};
use crate::fault::{FaultKind, MetricKind, Telemetry};
use crate::health::{components, HealthRegistry};
use crate::models::{IncidentId, ServiceProfile};
use crate::observability::SimulatorMetrics;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sink label used in error counters for the in-process metrics sink
pub const METRICS_SINK: &str = "metrics";

pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes generated telemetry to the metrics sink, the log sink and the store
pub struct TelemetryDispatcher {
    metrics: Arc<dyn MetricsSink>,
    logs: Arc<dyn LogSink>,
    /// `None` when persistence is disabled; store calls become no-ops
    store: Option<Arc<dyn IncidentStore>>,
    timeout: Duration,
    health: Option<HealthRegistry>,
    self_metrics: Option<SimulatorMetrics>,
}

impl TelemetryDispatcher {
    pub fn new(
        metrics: Arc<dyn MetricsSink>,
        logs: Arc<dyn LogSink>,
        store: Option<Arc<dyn IncidentStore>>,
    ) -> Self {
        Self {
            metrics,
            logs,
            store,
            timeout: DEFAULT_SINK_TIMEOUT,
            health: None,
            self_metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_self_metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.self_metrics = Some(metrics);
        self
    }

    pub fn persistence_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Forward one pod's telemetry
    ///
    /// Observations go to the metrics sink and the store; log lines go to the
    /// log sink and the store. All records carry the active incident id.
    pub async fn emit(
        &self,
        service: &str,
        pod: &str,
        telemetry: &Telemetry,
        incident_id: Option<&IncidentId>,
        now: DateTime<Utc>,
    ) {
        for observation in &telemetry.observations {
            let labels = observation.labels(service);
            let name = observation.metric.name();
            let recorded = match observation.metric.kind() {
                MetricKind::Gauge => self.metrics.record_gauge(name, &labels, observation.value),
                MetricKind::Histogram => {
                    self.metrics.record_histogram(name, &labels, observation.value)
                }
            };
            if let Err(e) = recorded {
                self.count_error(METRICS_SINK);
                warn!(metric = %name, service = %service, error = %e, "Failed to record metric");
            }

            if let Some(store) = &self.store {
                let record = MetricRecord {
                    service: service.to_string(),
                    pod: pod.to_string(),
                    metric: name.to_string(),
                    value: observation.value,
                    labels,
                    timestamp: now,
                    incident_id: incident_id.cloned(),
                };
                self.call(components::INCIDENT_STORE, "insert_metric", store.insert_metric(&record))
                    .await;
            }
        }

        for line in &telemetry.logs {
            let entry = LogEntry {
                service: service.to_string(),
                pod: Some(pod.to_string()),
                level: line.level,
                message: line.message.clone(),
                labels: Labels::new(),
                timestamp: now,
                incident_id: incident_id.cloned(),
            };
            self.call(components::LOG_SINK, "push_log", self.logs.push_log(&entry))
                .await;
            if let Some(store) = &self.store {
                self.call(components::INCIDENT_STORE, "insert_log", store.insert_log(&entry))
                    .await;
            }
        }
    }

    /// Create the incident record for a newly started fault
    pub async fn open_incident(
        &self,
        service: &ServiceProfile,
        kind: FaultKind,
        now: DateTime<Utc>,
    ) -> Option<IncidentId> {
        let store = self.store.as_ref()?;
        let incident = NewIncident::new(kind, service.name(), service.pods().to_vec(), now);
        self.call(
            components::INCIDENT_STORE,
            "create_incident",
            store.create_incident(&incident),
        )
        .await
    }

    /// Mark an incident resolved or aborted
    pub async fn close_incident(
        &self,
        incident_id: &IncidentId,
        status: IncidentStatus,
        end_time: DateTime<Utc>,
    ) {
        if let Some(store) = &self.store {
            self.call(
                components::INCIDENT_STORE,
                "update_incident_status",
                store.update_incident_status(incident_id, status, Some(end_time)),
            )
            .await;
        }
    }

    /// Release collaborator resources at shutdown
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            if tokio::time::timeout(self.timeout, store.close()).await.is_err() {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Timed out closing incident store");
            }
        }
    }

    /// Run one collaborator call under the timeout, absorbing any failure
    async fn call<T, F>(&self, component: &'static str, operation: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = SinkResult<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        };

        match result {
            Ok(value) => {
                if let Some(health) = &self.health {
                    health.record_success(component).await;
                }
                Some(value)
            }
            Err(e) => {
                self.count_error(component);
                if let Some(health) = &self.health {
                    health.record_failure(component, e.to_string()).await;
                }
                warn!(component = %component, operation = %operation, error = %e, "Telemetry call failed");
                None
            }
        }
    }

    fn count_error(&self, sink: &str) {
        if let Some(metrics) = &self.self_metrics {
            metrics.inc_sink_error(sink);
        }
        debug!(sink = %sink, "Counted sink error");
    }
}
