//! Observability for the simulator itself
//!
//! Provides:
//! - Self-metrics (tick latency, fault counters, sink errors) on an injected registry
//! - Structured JSON event logging with tracing

use crate::fault::FaultKind;
use crate::incident::SafetyLimits;
use crate::models::IncidentId;
use crate::simulation::FleetStatus;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::{error, info, warn};

/// Histogram buckets for tick duration (in seconds)
const TICK_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Simulator self-metrics
///
/// Clones share the same underlying instruments.
#[derive(Clone)]
pub struct SimulatorMetrics {
    ticks_total: IntCounter,
    tick_duration_seconds: Histogram,
    faults_started_total: IntCounterVec,
    faults_resolved_total: IntCounterVec,
    active_faults: IntGauge,
    sink_errors_total: IntCounterVec,
}

impl SimulatorMetrics {
    /// Create and register all self-metrics in `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            ticks_total: IntCounter::new(
                "incident_simulator_ticks_total",
                "Simulation ticks completed",
            )?,
            tick_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "incident_simulator_tick_duration_seconds",
                    "Time spent processing one simulation tick",
                )
                .buckets(TICK_BUCKETS.to_vec()),
            )?,
            faults_started_total: IntCounterVec::new(
                Opts::new(
                    "incident_simulator_faults_started_total",
                    "Simulated faults started",
                ),
                &["kind"],
            )?,
            faults_resolved_total: IntCounterVec::new(
                Opts::new(
                    "incident_simulator_faults_resolved_total",
                    "Simulated faults resolved",
                ),
                &["kind"],
            )?,
            active_faults: IntGauge::new(
                "incident_simulator_active_faults",
                "Services with an active simulated fault",
            )?,
            sink_errors_total: IntCounterVec::new(
                Opts::new(
                    "incident_simulator_sink_errors_total",
                    "Failed telemetry collaborator calls",
                ),
                &["sink"],
            )?,
        };

        registry.register(Box::new(metrics.ticks_total.clone()))?;
        registry.register(Box::new(metrics.tick_duration_seconds.clone()))?;
        registry.register(Box::new(metrics.faults_started_total.clone()))?;
        registry.register(Box::new(metrics.faults_resolved_total.clone()))?;
        registry.register(Box::new(metrics.active_faults.clone()))?;
        registry.register(Box::new(metrics.sink_errors_total.clone()))?;

        Ok(metrics)
    }

    pub fn observe_tick(&self, duration_secs: f64) {
        self.ticks_total.inc();
        self.tick_duration_seconds.observe(duration_secs);
    }

    pub fn inc_fault_started(&self, kind: FaultKind) {
        self.faults_started_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_fault_resolved(&self, kind: FaultKind) {
        self.faults_resolved_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn set_active_faults(&self, count: usize) {
        self.active_faults.set(count as i64);
    }

    pub fn inc_sink_error(&self, sink: &str) {
        self.sink_errors_total.with_label_values(&[sink]).inc();
    }

    pub fn ticks(&self) -> u64 {
        self.ticks_total.get()
    }

    pub fn faults_started(&self, kind: FaultKind) -> u64 {
        self.faults_started_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    pub fn sink_errors(&self, sink: &str) -> u64 {
        self.sink_errors_total.with_label_values(&[sink]).get()
    }
}

/// Structured logger for simulator events
///
/// Every event carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, services: usize, pods: usize, limits: &SafetyLimits) {
        info!(
            event = "simulator_started",
            instance = %self.instance,
            version = %version,
            services = services,
            pods = pods,
            max_concurrent = limits.max_concurrent,
            max_total = limits.max_total,
            max_runtime_secs = limits.max_runtime.as_secs(),
            fault_timeout_secs = limits.fault_timeout.as_secs(),
            "Incident simulator started"
        );
    }

    pub fn log_fault_started(
        &self,
        service: &str,
        kind: FaultKind,
        duration_secs: u64,
        incident_id: Option<&IncidentId>,
    ) {
        info!(
            event = "fault_started",
            instance = %self.instance,
            service = %service,
            kind = %kind,
            severity = %kind.severity(),
            duration_secs = duration_secs,
            incident_id = ?incident_id.map(IncidentId::as_str),
            "Started {} fault on {}",
            kind,
            service
        );
    }

    pub fn log_fault_resolved(
        &self,
        service: &str,
        kind: FaultKind,
        elapsed_secs: Option<u64>,
        incident_id: Option<&IncidentId>,
    ) {
        info!(
            event = "fault_resolved",
            instance = %self.instance,
            service = %service,
            kind = %kind,
            elapsed_secs = ?elapsed_secs,
            incident_id = ?incident_id.map(IncidentId::as_str),
            "Resolved {} fault on {}",
            kind,
            service
        );
    }

    /// A service's failure boundary reset its fault state
    pub fn log_fault_aborted(&self, service: &str, kind: Option<FaultKind>, reason: &str) {
        error!(
            event = "fault_aborted",
            instance = %self.instance,
            service = %service,
            kind = ?kind.map(|k| k.as_str()),
            reason = %reason,
            "Error processing service, fault state reset"
        );
    }

    pub fn log_fleet_status(&self, status: &FleetStatus) {
        let active: Vec<&str> = status
            .active_faults
            .iter()
            .map(|f| f.service.as_str())
            .collect();
        info!(
            event = "fleet_status",
            instance = %self.instance,
            total_generated = status.total_generated,
            active_count = status.active_faults.len(),
            active_services = ?active,
            uptime_secs = status.uptime_secs,
            halted = ?status.halted,
            "Status: {} total faults, {} active",
            status.total_generated,
            status.active_faults.len()
        );
    }

    pub fn log_degraded(&self, component: &str, reason: &str) {
        warn!(
            event = "component_degraded",
            instance = %self.instance,
            component = %component,
            reason = %reason,
            "Continuing without {}",
            component
        );
    }

    pub fn log_shutdown(&self, reason: &str, total_generated: u64) {
        info!(
            event = "simulator_shutdown",
            instance = %self.instance,
            reason = %reason,
            total_generated = total_generated,
            "Incident simulator stopped"
        );
    }
}
