//! Telemetry produced by fault generators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prometheus instrument type backing a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Histogram,
}

/// Metric families emitted by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUsage,
    MemoryUsage,
    DiskUsage,
    NetworkLatency,
    ErrorRate,
    ResponseTime,
    DbConnections,
    QueueDepth,
    GcTime,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::CpuUsage,
        Metric::MemoryUsage,
        Metric::DiskUsage,
        Metric::NetworkLatency,
        Metric::ErrorRate,
        Metric::ResponseTime,
        Metric::DbConnections,
        Metric::QueueDepth,
        Metric::GcTime,
    ];

    /// Exposed Prometheus metric name
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CpuUsage => "service_cpu_usage",
            Metric::MemoryUsage => "service_memory_usage",
            Metric::DiskUsage => "service_disk_usage",
            Metric::NetworkLatency => "service_network_latency_ms",
            Metric::ErrorRate => "service_error_rate",
            Metric::ResponseTime => "service_response_time_seconds",
            Metric::DbConnections => "service_db_connections",
            Metric::QueueDepth => "service_queue_depth",
            Metric::GcTime => "service_gc_time_ms",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Metric::CpuUsage => "CPU usage percentage",
            Metric::MemoryUsage => "Memory usage percentage",
            Metric::DiskUsage => "Disk usage percentage",
            Metric::NetworkLatency => "Network latency in milliseconds",
            Metric::ErrorRate => "Error rate percentage",
            Metric::ResponseTime => "Response time in seconds",
            Metric::DbConnections => "Active database connections",
            Metric::QueueDepth => "Message queue depth",
            Metric::GcTime => "Garbage collection time in milliseconds",
        }
    }

    /// Second label alongside `service`
    pub fn label_key(&self) -> &'static str {
        match self {
            Metric::CpuUsage | Metric::MemoryUsage | Metric::DiskUsage => "pod",
            Metric::NetworkLatency => "target",
            Metric::ErrorRate => "error_type",
            Metric::ResponseTime => "endpoint",
            Metric::DbConnections => "db_name",
            Metric::QueueDepth => "queue_name",
            Metric::GcTime => "gc_type",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::ResponseTime => MetricKind::Histogram,
            _ => MetricKind::Gauge,
        }
    }

    /// Inclusive bounds every emitted value is clamped to
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Metric::CpuUsage => (1.0, 99.0),
            Metric::MemoryUsage => (1.0, 98.0),
            Metric::DiskUsage => (1.0, 99.0),
            Metric::NetworkLatency => (0.0, 2000.0),
            Metric::ErrorRate => (0.0, 100.0),
            Metric::ResponseTime => (0.0, 30.0),
            Metric::DbConnections => (0.0, 200.0),
            Metric::QueueDepth => (0.0, 10_000.0),
            Metric::GcTime => (0.0, 5000.0),
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        if value.is_nan() {
            return lo;
        }
        value.clamp(lo, hi)
    }

    /// Look up a metric by its exposed name
    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single metric value produced for one pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub metric: Metric,
    /// Value of the metric's secondary label (pod, endpoint, db_name, ...)
    pub label_value: String,
    pub value: f64,
}

impl Observation {
    /// Full label set for this observation on the given service
    pub fn labels(&self, service: &str) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), service.to_string());
        labels.insert(self.metric.label_key().to_string(), self.label_value.clone());
        labels
    }
}

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Output of one generator call for one pod
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub observations: Vec<Observation>,
    pub logs: Vec<LogLine>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, clamped to the metric's bounds. Returns the stored value.
    pub fn record(&mut self, metric: Metric, label_value: impl Into<String>, value: f64) -> f64 {
        let value = metric.clamp(value);
        self.observations.push(Observation {
            metric,
            label_value: label_value.into(),
            value,
        });
        value
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogLine {
            level,
            message: message.into(),
        });
    }

    /// First recorded value for a metric
    pub fn value_of(&self, metric: Metric) -> Option<f64> {
        self.observations
            .iter()
            .find(|o| o.metric == metric)
            .map(|o| o.value)
    }

    /// Highest log level emitted, if any
    pub fn max_level(&self) -> Option<LogLevel> {
        self.logs.iter().map(|l| l.level).max()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() && self.logs.is_empty()
    }
}
