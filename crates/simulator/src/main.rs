//! Incident Simulator - synthetic production incidents for monitoring pipelines
//!
//! This binary drives a simulated fleet of services through fault episodes,
//! exporting the resulting metrics to Prometheus, shipping logs to Loki and
//! recording incidents in PostgreSQL.

use anyhow::Result;
use chrono::Utc;
use incident_lib::{
    fleet::FleetDefinition,
    health::{components, HealthRegistry},
    observability::{SimulatorMetrics, StructuredLogger},
    rng::{RandomSource, StdRandom},
    simulation::SimulationLoopBuilder,
    telemetry::{
        IncidentStore, LokiLogSink, PostgresIncidentStore, PostgresSettings,
        PrometheusMetricsSink, TelemetryDispatcher,
    },
};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SIMULATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTANCE: &str = "incident-simulator";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting incident-simulator");

    // Load configuration
    let config = config::SimulatorConfig::load()?;
    info!(
        api_port = config.api_port,
        tick_interval_secs = config.tick_interval_secs,
        seeded = config.rng_seed.is_some(),
        "Simulator configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SIMULATION_LOOP).await;
    health_registry.register(components::LOG_SINK).await;
    health_registry.register(components::INCIDENT_STORE).await;

    // Metrics registry shared by the simulated families and self-metrics
    let registry = Registry::new();
    let self_metrics = SimulatorMetrics::new(&registry)?;
    let logger = StructuredLogger::new(INSTANCE);

    // Telemetry collaborators
    let metrics_sink = Arc::new(PrometheusMetricsSink::new(&registry)?);
    let log_sink = Arc::new(LokiLogSink::new(&config.loki_url, config.sink_timeout())?);
    let store = connect_store(&health_registry, &logger).await;

    let dispatcher = TelemetryDispatcher::new(metrics_sink, log_sink, store)
        .with_timeout(config.sink_timeout())
        .with_health(health_registry.clone())
        .with_self_metrics(self_metrics.clone());

    // Fleet
    let definition = match &config.fleet_file {
        Some(path) => {
            info!(path = %path.display(), "Loading fleet definition");
            FleetDefinition::load(path)?
        }
        None => FleetDefinition::builtin(),
    };
    let (fleet, patterns) = definition.into_state(Utc::now());

    let rng: Box<dyn RandomSource> = match config.rng_seed {
        Some(seed) => Box::new(StdRandom::seeded(seed)),
        None => Box::new(StdRandom::from_entropy()),
    };

    let limits = config.limits();
    logger.log_startup(SIMULATOR_VERSION, fleet.len(), fleet.pod_count(), &limits);

    let (simulation, status_rx) = SimulationLoopBuilder::new()
        .fleet(fleet)
        .dispatcher(dispatcher)
        .patterns(patterns)
        .limits(limits)
        .rng(rng)
        .config(config.simulation())
        .logger(logger)
        .self_metrics(self_metrics)
        .health(health_registry.clone())
        .build()?;

    // Start health, metrics and status server
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        registry,
        status_rx,
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Start the simulation loop
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let simulation_handle = tokio::spawn(simulation.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    if shutdown_tx.send(()).is_err() {
        warn!("Simulation loop already stopped");
    }

    let final_status = simulation_handle.await?;
    api_handle.abort();
    info!(
        total_generated = final_status.total_generated,
        ticks = final_status.ticks,
        "Shutting down"
    );

    Ok(())
}

/// Connect to PostgreSQL, or run without persistence when it is unavailable
async fn connect_store(
    health: &HealthRegistry,
    logger: &StructuredLogger,
) -> Option<Arc<dyn IncidentStore>> {
    let connected = match PostgresSettings::from_env() {
        Ok(settings) => PostgresIncidentStore::connect(&settings).await,
        Err(e) => Err(e),
    };

    match connected {
        Ok(store) => {
            info!("Connected to incident store");
            Some(Arc::new(store) as Arc<dyn IncidentStore>)
        }
        Err(e) => {
            let reason = e.to_string();
            logger.log_degraded(components::INCIDENT_STORE, &reason);
            health
                .set_degraded(
                    components::INCIDENT_STORE,
                    format!("persistence disabled: {reason}"),
                )
                .await;
            None
        }
    }
}
