//! Simulator configuration

use anyhow::{bail, Result};
use incident_lib::incident::SafetyLimits;
use incident_lib::simulation::SimulationConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Simulator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between simulation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_max_concurrent_faults")]
    pub max_concurrent_faults: usize,

    /// Hours after which no new faults start
    #[serde(default = "default_max_runtime_hours")]
    pub max_runtime_hours: u64,

    #[serde(default = "default_max_total_faults")]
    pub max_total_faults: u64,

    /// Faults older than this are force-ended
    #[serde(default = "default_fault_timeout")]
    pub fault_timeout_secs: u64,

    /// Log a fleet status report every this many generated faults
    #[serde(default = "default_status_report_every")]
    pub status_report_every: u64,

    #[serde(default = "default_normal_log_probability")]
    pub normal_log_probability: f64,

    /// Loki push endpoint
    #[serde(default = "default_loki_url")]
    pub loki_url: String,

    /// Upper bound on any single collaborator call
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,

    /// Seed for reproducible runs; entropy when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,

    /// JSON fleet definition; built-in fleet when unset
    #[serde(default)]
    pub fleet_file: Option<PathBuf>,
}

fn default_api_port() -> u16 {
    8000
}

fn default_tick_interval() -> u64 {
    10
}

fn default_max_concurrent_faults() -> usize {
    3
}

fn default_max_runtime_hours() -> u64 {
    8
}

fn default_max_total_faults() -> u64 {
    50
}

fn default_fault_timeout() -> u64 {
    3600
}

fn default_status_report_every() -> u64 {
    10
}

fn default_normal_log_probability() -> f64 {
    0.05
}

fn default_loki_url() -> String {
    incident_lib::telemetry::DEFAULT_LOKI_URL.to_string()
}

fn default_sink_timeout_ms() -> u64 {
    2000
}

impl SimulatorConfig {
    /// Load configuration from a `.env` file (if any) and `SIM_*` environment variables
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_source(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_source(source: Option<config::Map<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SIM")
                    .try_parsing(true)
                    .source(source),
            )
            .build()?;

        let loaded: SimulatorConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            bail!("tick_interval_secs must be greater than zero");
        }
        if self.max_concurrent_faults == 0 {
            bail!("max_concurrent_faults must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.normal_log_probability) {
            bail!(
                "normal_log_probability must be within [0, 1], got {}",
                self.normal_log_probability
            );
        }
        if self.sink_timeout_ms == 0 {
            bail!("sink_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn limits(&self) -> SafetyLimits {
        SafetyLimits {
            max_concurrent: self.max_concurrent_faults,
            max_runtime: Duration::from_secs(self.max_runtime_hours * 3600),
            max_total: self.max_total_faults,
            fault_timeout: Duration::from_secs(self.fault_timeout_secs),
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            status_report_every: self.status_report_every,
            normal_log_probability: self.normal_log_probability,
        }
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = SimulatorConfig::from_source(vars(&[])).unwrap();

        assert_eq!(config.api_port, 8000);
        assert_eq!(config.tick_interval_secs, 10);
        assert_eq!(config.status_report_every, 10);
        assert_eq!(config.loki_url, "http://localhost:3100/loki/api/v1/push");
        assert_eq!(config.rng_seed, None);
        assert_eq!(config.fleet_file, None);
        assert_eq!(config.limits(), SafetyLimits::default());
        assert_eq!(config.sink_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_environment_overrides() {
        let config = SimulatorConfig::from_source(vars(&[
            ("SIM_API_PORT", "9100"),
            ("SIM_MAX_CONCURRENT_FAULTS", "5"),
            ("SIM_MAX_RUNTIME_HOURS", "2"),
            ("SIM_RNG_SEED", "42"),
            ("SIM_NORMAL_LOG_PROBABILITY", "0.5"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.rng_seed, Some(42));
        let limits = config.limits();
        assert_eq!(limits.max_concurrent, 5);
        assert_eq!(limits.max_runtime, Duration::from_secs(7200));
        assert_eq!(config.simulation().normal_log_probability, 0.5);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(SimulatorConfig::from_source(vars(&[("SIM_TICK_INTERVAL_SECS", "0")])).is_err());
        assert!(
            SimulatorConfig::from_source(vars(&[("SIM_MAX_CONCURRENT_FAULTS", "0")])).is_err()
        );
        assert!(
            SimulatorConfig::from_source(vars(&[("SIM_NORMAL_LOG_PROBABILITY", "1.5")])).is_err()
        );
        assert!(SimulatorConfig::from_source(vars(&[("SIM_SINK_TIMEOUT_MS", "0")])).is_err());
    }

    #[test]
    fn test_rejects_unparseable_port() {
        assert!(SimulatorConfig::from_source(vars(&[("SIM_API_PORT", "not-a-port")])).is_err());
    }
}
