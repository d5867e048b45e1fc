//! Error types for the incident simulator

use std::time::Duration;
use thiserror::Error;

/// Errors raised by telemetry collaborators (metrics, log sink, incident store)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collaborator returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Collaborator call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid collaborator URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Malformed incident id: {0}")]
    InvalidIncidentId(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while processing a single service within a tick
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Fault on {service} started {skew_secs}s in the future")]
    ClockSkew { service: String, skew_secs: i64 },
}

/// Errors raised when validating a fleet definition
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    #[error("Service {0} has no pods")]
    NoPods(String),

    #[error("Pattern {kind} has an empty duration range ({min}..={max})")]
    InvalidDuration { kind: String, min: u64, max: u64 },

    #[error("Pattern {kind} lasts up to {max}s, above the {limit}s ceiling")]
    DurationTooLong { kind: String, max: u64, limit: u64 },

    #[error("Pattern {kind} has probability {probability} outside [0, 1]")]
    InvalidProbability { kind: String, probability: f64 },

    #[error("Failed to read fleet definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse fleet definition: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;
