//! Incident simulation library
//!
//! This crate provides the core functionality for:
//! - A per-service fault state machine with global safety limits
//! - Fault patterns and their telemetry generators
//! - The simulation loop driving a fleet of services
//! - Telemetry sinks for Prometheus, Loki and PostgreSQL
//! - Health checks and observability

pub mod error;
pub mod fault;
pub mod fleet;
pub mod health;
pub mod incident;
pub mod models;
pub mod observability;
pub mod rng;
pub mod simulation;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{FleetError, SimulationError, SinkError, SinkResult};
pub use fault::{FaultKind, FaultPattern, Severity};
pub use fleet::{default_services, FleetDefinition, FleetState, HaltReason};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use incident::{IncidentStateMachine, SafetyLimits};
pub use models::*;
pub use observability::{SimulatorMetrics, StructuredLogger};
pub use rng::{RandomSource, StdRandom};
pub use simulation::{FleetStatus, SimulationConfig, SimulationLoop, SimulationLoopBuilder};
