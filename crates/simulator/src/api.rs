//! HTTP API for health checks, Prometheus metrics and fleet status

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use incident_lib::{health::HealthRegistry, simulation::FleetStatus};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub registry: Registry,
    pub status: watch::Receiver<FleetStatus>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        registry: Registry,
        status: watch::Receiver<FleetStatus>,
    ) -> Self {
        Self {
            health_registry,
            registry,
            status,
        }
    }
}

fn probe_status(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness: 200 while every component is operational (degraded sinks included)
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (probe_status(health.status.is_operational()), Json(health))
}

/// Readiness: 200 once the simulation loop is running
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    (probe_status(readiness.ready), Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest fleet snapshot
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.status.borrow().clone();
    Json(snapshot)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use incident_lib::fleet::{default_services, FleetState};
    use incident_lib::health::components;
    use incident_lib::observability::SimulatorMetrics;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        health: HealthRegistry,
        status_tx: watch::Sender<FleetStatus>,
        metrics: SimulatorMetrics,
    }

    async fn create_test_app() -> TestApp {
        let health = HealthRegistry::new();
        health.register(components::SIMULATION_LOOP).await;
        health.register(components::LOG_SINK).await;
        health.register(components::INCIDENT_STORE).await;

        let registry = Registry::new();
        let metrics = SimulatorMetrics::new(&registry).unwrap();
        let (status_tx, status_rx) = watch::channel(FleetStatus::default());
        let state = Arc::new(AppState::new(health.clone(), registry, status_rx));

        TestApp {
            router: create_router(state),
            health,
            status_tx,
            metrics,
        }
    }

    async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_ok_when_degraded() {
        let app = create_test_app().await;
        app.health
            .set_degraded(components::INCIDENT_STORE, "database unreachable")
            .await;

        let (status, body) = get(&app.router, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("degraded"));
        assert!(body.contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_healthz_unavailable_when_loop_stopped() {
        let app = create_test_app().await;
        app.health
            .set_unhealthy(components::SIMULATION_LOOP, "simulation loop stopped")
            .await;

        let (status, _) = get(&app.router, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let app = create_test_app().await;

        let (status, body) = get(&app.router, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("Simulation loop not started"));

        app.health.set_ready(true).await;
        let (status, _) = get(&app.router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposes_injected_registry() {
        let app = create_test_app().await;
        app.metrics.observe_tick(0.01);

        let (status, body) = get(&app.router, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("incident_simulator_ticks_total 1"));
    }

    #[tokio::test]
    async fn test_status_returns_latest_snapshot() {
        let app = create_test_app().await;
        let now = Utc::now();
        let fleet = FleetState::new(default_services(), now);
        app.status_tx
            .send_replace(FleetStatus::capture(&fleet, 4, now));

        let (status, body) = get(&app.router, "/status").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["ticks"], 4);
        assert_eq!(json["services"], 7);
        assert_eq!(json["pods"], 12);
    }
}
