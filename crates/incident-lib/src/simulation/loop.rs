//! Simulation loop
//!
//! Ticks every service in fleet order at a fixed interval: decide fault
//! start or end, generate telemetry for every pod, forward it to the
//! dispatcher and publish a fleet snapshot.

use super::clock::{Clock, SystemClock};
use super::status::FleetStatus;
use crate::error::SimulationError;
use crate::fault::{
    default_patterns, generate_normal, FaultKind, FaultPattern, GeneratorTable,
    DEFAULT_NORMAL_LOG_PROBABILITY,
};
use crate::fleet::FleetState;
use crate::health::{components, HealthRegistry};
use crate::incident::{IncidentStateMachine, SafetyLimits};
use crate::observability::{SimulatorMetrics, StructuredLogger};
use crate::rng::{RandomSource, StdRandom};
use crate::telemetry::{IncidentStatus, TelemetryDispatcher};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the simulation loop
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Time between ticks (default: 10 seconds)
    pub tick_interval: Duration,
    /// Log a fleet status report each time the fault total crosses a multiple of this
    pub status_report_every: u64,
    /// Chance of an informational log line per healthy pod per tick
    pub normal_log_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            status_report_every: 10,
            normal_log_probability: DEFAULT_NORMAL_LOG_PROBABILITY,
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub started: Vec<(String, FaultKind)>,
    pub resolved: Vec<(String, FaultKind)>,
    /// Services whose processing failed and whose fault state was reset
    pub aborted: Vec<String>,
    pub observations: usize,
    pub logs: usize,
    pub status_reported: bool,
}

/// Single-task driver owning the fleet state
pub struct SimulationLoop {
    fleet: FleetState,
    machine: IncidentStateMachine,
    generators: GeneratorTable,
    dispatcher: TelemetryDispatcher,
    rng: Box<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    config: SimulationConfig,
    logger: StructuredLogger,
    self_metrics: Option<SimulatorMetrics>,
    health: Option<HealthRegistry>,
    status_tx: watch::Sender<FleetStatus>,
    ticks: u64,
    last_reported_total: u64,
}

impl SimulationLoop {
    pub fn fleet(&self) -> &FleetState {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut FleetState {
        &mut self.fleet
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Receiver for the snapshot published after every tick
    pub fn subscribe(&self) -> watch::Receiver<FleetStatus> {
        self.status_tx.subscribe()
    }

    /// Run until a shutdown signal arrives, then close the telemetry sinks
    ///
    /// The signal is observed between ticks, so an in-flight tick always
    /// completes. Returns the final fleet snapshot.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> FleetStatus {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            services = self.fleet.len(),
            pods = self.fleet.pod_count(),
            "Starting simulation loop"
        );
        if let Some(health) = &self.health {
            health.set_healthy(components::SIMULATION_LOOP).await;
            health.set_ready(true).await;
        }

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(
                        tick = self.ticks,
                        started = report.started.len(),
                        resolved = report.resolved.len(),
                        aborted = report.aborted.len(),
                        observations = report.observations,
                        "Tick complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down simulation loop");
                    break;
                }
            }
        }

        self.dispatcher.close().await;
        if let Some(health) = &self.health {
            health.set_ready(false).await;
            health
                .set_unhealthy(components::SIMULATION_LOOP, "simulation loop stopped")
                .await;
        }
        self.logger
            .log_shutdown("shutdown requested", self.fleet.total_generated());

        FleetStatus::capture(&self.fleet, self.ticks, self.clock.now())
    }

    /// Process every service once, in fleet order
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        for index in 0..self.fleet.len() {
            if let Err(e) = self.process_service(index, &mut report).await {
                self.abort_service(index, &e, &mut report).await;
            }
        }
        self.ticks += 1;

        let now = self.clock.now();
        let status = FleetStatus::capture(&self.fleet, self.ticks, now);
        if self.crossed_report_threshold() {
            self.logger.log_fleet_status(&status);
            report.status_reported = true;
        }
        self.last_reported_total = self.fleet.total_generated();

        if let Some(metrics) = &self.self_metrics {
            metrics.observe_tick(started.elapsed().as_secs_f64());
            metrics.set_active_faults(status.active_faults.len());
        }
        self.status_tx.send_replace(status);

        report
    }

    /// True once per new multiple of `status_report_every` reached by the total
    fn crossed_report_threshold(&self) -> bool {
        let every = self.config.status_report_every;
        if every == 0 {
            return false;
        }
        let total = self.fleet.total_generated();
        total > 0 && total / every > self.last_reported_total / every
    }

    async fn process_service(
        &mut self,
        index: usize,
        report: &mut TickReport,
    ) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let Some(service) = self.fleet.service(index) else {
            return Ok(());
        };

        if !service.has_active_fault() {
            if let Some(pattern) =
                self.machine
                    .decide_start(&mut self.fleet, index, now, self.rng.as_mut())
            {
                let kind = pattern.kind;
                let duration = self.machine.planned_duration(pattern, self.rng.as_mut());
                self.start_fault(index, kind, duration, now, report).await;
            }
        } else if self.machine.decide_end(service, now) {
            self.resolve_fault(index, now, report).await;
        }

        let Some(service) = self.fleet.service(index) else {
            return Ok(());
        };
        let elapsed = service.fault_elapsed(now)?;
        let incident_id = service.fault().incident_id().cloned();

        for pod in service.pods() {
            let telemetry = match (service.active_fault(), elapsed) {
                (Some(kind), Some(elapsed)) => {
                    match self
                        .generators
                        .generate(kind, service, pod, elapsed, self.rng.as_mut())
                    {
                        Some(telemetry) => telemetry,
                        None => {
                            warn!(
                                service = %service.name(),
                                pod = %pod,
                                kind = %kind,
                                "No generator registered for fault kind"
                            );
                            continue;
                        }
                    }
                }
                _ => generate_normal(
                    service,
                    pod,
                    self.rng.as_mut(),
                    self.config.normal_log_probability,
                ),
            };

            report.observations += telemetry.observations.len();
            report.logs += telemetry.logs.len();
            self.dispatcher
                .emit(service.name(), pod, &telemetry, incident_id.as_ref(), now)
                .await;
        }

        Ok(())
    }

    async fn start_fault(
        &mut self,
        index: usize,
        kind: FaultKind,
        duration: u64,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let Some(service) = self.fleet.service_mut(index) else {
            return;
        };
        service.begin_fault(kind, now, duration);

        // The in-memory fault stands even if the record cannot be created
        let incident_id = self.dispatcher.open_incident(service, kind, now).await;
        if let Some(id) = incident_id {
            service.attach_incident(id);
        }

        self.logger.log_fault_started(
            service.name(),
            kind,
            duration,
            service.fault().incident_id(),
        );
        if let Some(metrics) = &self.self_metrics {
            metrics.inc_fault_started(kind);
        }
        report.started.push((service.name().to_string(), kind));
    }

    async fn resolve_fault(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let Some(service) = self.fleet.service_mut(index) else {
            return;
        };
        let elapsed = service.fault_elapsed(now).ok().flatten();
        let previous = service.clear_fault();
        let Some(kind) = previous.kind() else {
            return;
        };

        if let Some(id) = previous.incident_id() {
            self.dispatcher
                .close_incident(id, IncidentStatus::Resolved, now)
                .await;
        }

        self.logger
            .log_fault_resolved(service.name(), kind, elapsed, previous.incident_id());
        if let Some(metrics) = &self.self_metrics {
            metrics.inc_fault_resolved(kind);
        }
        report.resolved.push((service.name().to_string(), kind));
    }

    /// Failure boundary: reset the service and mark its incident aborted
    async fn abort_service(&mut self, index: usize, error: &SimulationError, report: &mut TickReport) {
        let now = self.clock.now();
        let Some(service) = self.fleet.service_mut(index) else {
            return;
        };
        let previous = service.clear_fault();
        self.logger
            .log_fault_aborted(service.name(), previous.kind(), &error.to_string());

        if let Some(id) = previous.incident_id() {
            self.dispatcher
                .close_incident(id, IncidentStatus::Aborted, now)
                .await;
        }
        report.aborted.push(service.name().to_string());
    }
}

/// Builder for creating the simulation loop
pub struct SimulationLoopBuilder {
    fleet: Option<FleetState>,
    dispatcher: Option<TelemetryDispatcher>,
    patterns: Vec<FaultPattern>,
    limits: SafetyLimits,
    generators: GeneratorTable,
    rng: Option<Box<dyn RandomSource>>,
    clock: Arc<dyn Clock>,
    config: SimulationConfig,
    logger: StructuredLogger,
    self_metrics: Option<SimulatorMetrics>,
    health: Option<HealthRegistry>,
}

impl SimulationLoopBuilder {
    /// Create a builder with the built-in patterns and default limits
    pub fn new() -> Self {
        Self {
            fleet: None,
            dispatcher: None,
            patterns: default_patterns(),
            limits: SafetyLimits::default(),
            generators: GeneratorTable::standard(),
            rng: None,
            clock: Arc::new(SystemClock),
            config: SimulationConfig::default(),
            logger: StructuredLogger::new("incident-simulator"),
            self_metrics: None,
            health: None,
        }
    }

    pub fn fleet(mut self, fleet: FleetState) -> Self {
        self.fleet = Some(fleet);
        self
    }

    pub fn dispatcher(mut self, dispatcher: TelemetryDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn patterns(mut self, patterns: Vec<FaultPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn generators(mut self, generators: GeneratorTable) -> Self {
        self.generators = generators;
        self
    }

    /// Random source (default: entropy-seeded)
    pub fn rng(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn self_metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.self_metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the loop and a receiver for its fleet snapshots
    pub fn build(self) -> Result<(SimulationLoop, watch::Receiver<FleetStatus>)> {
        let fleet = self
            .fleet
            .ok_or_else(|| anyhow::anyhow!("Fleet is required"))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| anyhow::anyhow!("Telemetry dispatcher is required"))?;
        if self.config.tick_interval.is_zero() {
            anyhow::bail!("Tick interval must be non-zero");
        }

        let now = self.clock.now();
        let (status_tx, status_rx) = watch::channel(FleetStatus::capture(&fleet, 0, now));

        let simulation = SimulationLoop {
            fleet,
            machine: IncidentStateMachine::new(self.patterns, self.limits),
            generators: self.generators,
            dispatcher,
            rng: self
                .rng
                .unwrap_or_else(|| Box::new(StdRandom::from_entropy())),
            clock: self.clock,
            config: self.config,
            logger: self.logger,
            self_metrics: self.self_metrics,
            health: self.health,
            status_tx,
            ticks: 0,
            last_reported_total: 0,
        };

        Ok((simulation, status_rx))
    }
}

impl Default for SimulationLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
