//! Telemetry sinks for simulated signals
//!
//! This module provides:
//! - Collaborator traits for metrics, log shipping and incident persistence
//! - Prometheus, Loki and PostgreSQL adapters
//! - A dispatcher that bounds, logs and absorbs every collaborator failure

mod dispatcher;
mod loki;
mod metrics;
mod postgres;
mod sink;

pub use dispatcher::{TelemetryDispatcher, DEFAULT_SINK_TIMEOUT, METRICS_SINK};
pub use loki::{LokiLogSink, DEFAULT_LOKI_URL};
pub use metrics::PrometheusMetricsSink;
pub use postgres::{PostgresIncidentStore, PostgresSettings};
pub use sink::{
    IncidentStatus, IncidentStore, Labels, LogEntry, LogSink, MetricRecord, MetricsSink,
    NewIncident,
};
