//! Health tracking for the simulator
//!
//! The simulation loop and each telemetry collaborator report into a shared
//! [`HealthRegistry`]. Sinks flip to degraded on a failed call and back to
//! healthy on the next success; the HTTP API turns the registry into
//! liveness and readiness responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Calls are failing or the component is disabled; the simulation continues
    Degraded,
    /// Component has stopped
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed calls since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            consecutive_failures: 0,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Liveness payload served on `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components; healthy when none are registered
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness payload served on `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    fn not_ready(reason: &str) -> Self {
        Self {
            ready: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// Component names for health tracking
pub mod components {
    pub const SIMULATION_LOOP: &str = "simulation_loop";
    pub const LOG_SINK: &str = "log_sink";
    pub const INCIDENT_STORE: &str = "incident_store";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health; clones share state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.set_healthy(name).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record a failed collaborator call: degraded, failure count incremented
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let failures = state
            .components
            .get(name)
            .map_or(0, |h| h.consecutive_failures);
        let mut health = ComponentHealth::degraded(message);
        health.consecutive_failures = failures.saturating_add(1);
        state.components.insert(name.to_string(), health);
    }

    /// Record a successful collaborator call
    ///
    /// Only a component that was degraded by failures recovers; one disabled
    /// outright (for example persistence without credentials) stays degraded.
    pub async fn record_success(&self, name: &str) {
        let mut state = self.state.write().await;
        if let Some(health) = state.components.get_mut(name) {
            if health.status == ComponentStatus::Degraded && health.consecutive_failures > 0 {
                *health = ComponentHealth::healthy();
            }
        }
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        self.state
            .read()
            .await
            .components
            .get(name)
            .map(|h| h.status)
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
        }
    }

    /// Ready once the simulation loop is running and no component has stopped
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse::not_ready("Simulation loop not started");
        }
        match HealthResponse::compute_status(&state.components) {
            ComponentStatus::Unhealthy => {
                ReadinessResponse::not_ready("Simulator component stopped")
            }
            _ => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_degrades_and_recovers() {
        let registry = HealthRegistry::new();
        registry.register(components::LOG_SINK).await;

        registry.record_failure(components::LOG_SINK, "connection refused").await;
        registry.record_failure(components::LOG_SINK, "connection refused").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.components[components::LOG_SINK].consecutive_failures, 2);

        registry.record_success(components::LOG_SINK).await;
        assert_eq!(
            registry.status_of(components::LOG_SINK).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_disabled_component_stays_degraded_on_success() {
        let registry = HealthRegistry::new();
        registry
            .set_degraded(components::INCIDENT_STORE, "persistence disabled")
            .await;

        registry.record_success(components::INCIDENT_STORE).await;
        assert_eq!(
            registry.status_of(components::INCIDENT_STORE).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_unhealthy_component_dominates() {
        let registry = HealthRegistry::new();
        registry.register(components::SIMULATION_LOOP).await;
        registry.set_degraded(components::LOG_SINK, "timeout").await;
        registry
            .set_unhealthy(components::SIMULATION_LOOP, "stopped")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.status.is_operational());
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_ready_while_degraded() {
        let registry = HealthRegistry::new();
        registry.register(components::SIMULATION_LOOP).await;
        registry.set_degraded(components::INCIDENT_STORE, "disabled").await;
        registry.set_ready(true).await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_when_loop_stopped() {
        let registry = HealthRegistry::new();
        registry.register(components::SIMULATION_LOOP).await;
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::SIMULATION_LOOP, "stopped")
            .await;

        assert!(!registry.readiness().await.ready);
    }
}
