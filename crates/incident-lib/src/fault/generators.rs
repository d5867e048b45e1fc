//! Telemetry generators
//!
//! Each generator is a pure function of the service baseline, the seconds
//! elapsed since the fault started and a random source. Values worsen with
//! elapsed time and are capped at a realistic ceiling; log lines escalate in
//! stages keyed to elapsed-time thresholds.

use super::telemetry::{LogLevel, Metric, Telemetry};
use super::FaultKind;
use crate::models::{ServiceCategory, ServiceProfile};
use crate::rng::RandomSource;
use std::collections::HashMap;

/// Probability of an informational log line per pod per tick during normal operation
pub const DEFAULT_NORMAL_LOG_PROBABILITY: f64 = 0.05;

/// Signature shared by all fault generators: (service, pod, elapsed seconds, rng)
pub type GeneratorFn = fn(&ServiceProfile, &str, u64, &mut dyn RandomSource) -> Telemetry;

const DB_NAME: &str = "userdb";
const QUEUE_NAME: &str = "user_events";
const API_ENDPOINT: &str = "/api/users";

const ERROR_BURST_MESSAGES: [&str; 4] = [
    "HTTP 400 Bad Request: Invalid user ID format",
    "HTTP 404 Not Found: User profile not found",
    "HTTP 429 Too Many Requests: Rate limit exceeded",
    "HTTP 503 Service Unavailable: Downstream service error",
];

/// Maps fault kinds to their generators
#[derive(Clone)]
pub struct GeneratorTable {
    generators: HashMap<FaultKind, GeneratorFn>,
}

impl GeneratorTable {
    /// Table with a generator for every fault kind
    pub fn standard() -> Self {
        Self::empty()
            .with(FaultKind::MemoryLeak, memory_leak)
            .with(FaultKind::CpuSpike, cpu_spike)
            .with(FaultKind::DatabaseSlow, database_slow)
            .with(FaultKind::NetworkLatency, network_latency)
            .with(FaultKind::DiskFull, disk_full)
            .with(FaultKind::ConnectionLeak, connection_leak)
            .with(FaultKind::QueueBacklog, queue_backlog)
            .with(FaultKind::GcPressure, gc_pressure)
            .with(FaultKind::ErrorBurst, error_burst)
    }

    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// Register (or replace) the generator for a kind
    pub fn with(mut self, kind: FaultKind, generator: GeneratorFn) -> Self {
        self.generators.insert(kind, generator);
        self
    }

    /// Remove the generator for a kind
    pub fn without(mut self, kind: FaultKind) -> Self {
        self.generators.remove(&kind);
        self
    }

    pub fn get(&self, kind: FaultKind) -> Option<GeneratorFn> {
        self.generators.get(&kind).copied()
    }

    /// Run the generator for `kind`, or `None` if the table has no entry
    pub fn generate(
        &self,
        kind: FaultKind,
        service: &ServiceProfile,
        pod: &str,
        elapsed_secs: u64,
        rng: &mut dyn RandomSource,
    ) -> Option<Telemetry> {
        self.get(kind)
            .map(|generator| generator(service, pod, elapsed_secs, rng))
    }
}

impl Default for GeneratorTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for GeneratorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.generators.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("GeneratorTable").field("kinds", &kinds).finish()
    }
}

fn offset(base: u32, rng: &mut dyn RandomSource, lo: i64, hi: i64) -> f64 {
    f64::from(base) + rng.int_in(lo, hi) as f64
}

pub(crate) fn memory_leak(
    service: &ServiceProfile,
    pod: &str,
    elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    let growth = (elapsed / 5).min(50) as f64;
    let memory = t.record(
        Metric::MemoryUsage,
        pod,
        (f64::from(service.base_memory()) + growth).min(98.0),
    );
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 5, 15));
    t.record(Metric::GcTime, "major", rng.int_in(100, 500) as f64);

    if elapsed < 30 {
        t.log(LogLevel::Warn, format!("Memory usage climbing: {memory:.0}%"));
    } else if elapsed < 120 {
        t.log(LogLevel::Error, "OutOfMemoryError: Java heap space");
        t.log(LogLevel::Warn, "GC overhead limit exceeded");
    } else {
        t.log(LogLevel::Error, "Failed to allocate memory for user session");
        t.log(LogLevel::Error, "Application becoming unresponsive");
    }
    t
}

pub(crate) fn cpu_spike(
    service: &ServiceProfile,
    pod: &str,
    _elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    let cpu = t.record(Metric::CpuUsage, pod, rng.int_in(91, 99) as f64);
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 5, 15));
    t.record(Metric::ResponseTime, API_ENDPOINT, rng.float_in(2.0, 8.0));

    t.log(LogLevel::Warn, format!("High CPU usage detected: {cpu:.0}%"));
    t.log(LogLevel::Error, "Thread pool queue at capacity");
    t.log(LogLevel::Warn, "Request processing delays detected");
    t
}

pub(crate) fn database_slow(
    service: &ServiceProfile,
    pod: &str,
    elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 10, 30));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 5, 20));
    let connections = t.record(
        Metric::DbConnections,
        DB_NAME,
        (f64::from(service.base_connections()) + (elapsed / 3) as f64).min(200.0),
    );
    t.record(Metric::ResponseTime, "query", rng.float_in(5.0, 15.0));

    let query_secs = rng.int_in(5, 15);
    t.log(
        LogLevel::Warn,
        format!("Slow query detected: SELECT * FROM users (took {query_secs}s)"),
    );
    t.log(
        LogLevel::Error,
        format!("Connection pool reaching limit: {connections:.0}/200"),
    );
    t.log(LogLevel::Warn, "Query timeout threshold exceeded");
    t
}

pub(crate) fn network_latency(
    service: &ServiceProfile,
    pod: &str,
    _elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 0, 10));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 0, 10));
    let latency = t.record(
        Metric::NetworkLatency,
        "external_api",
        rng.int_in(500, 2000) as f64,
    );
    t.record(Metric::ErrorRate, "timeout", rng.int_in(5, 25) as f64);

    t.log(
        LogLevel::Error,
        format!("Network timeout to external service (latency: {latency:.0}ms)"),
    );
    t.log(LogLevel::Warn, "Increased retry attempts for external calls");
    t.log(LogLevel::Error, "Circuit breaker opened for external service");
    t
}

pub(crate) fn disk_full(
    service: &ServiceProfile,
    pod: &str,
    elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 5, 15));
    t.record(Metric::MemoryUsage, pod, f64::from(service.base_memory()));
    let disk = t.record(
        Metric::DiskUsage,
        pod,
        (70.0 + (elapsed / 10) as f64).min(99.0),
    );

    if disk >= 90.0 {
        t.log(LogLevel::Error, format!("Disk space critical: {disk:.0}% used"));
        t.log(
            LogLevel::Error,
            "Failed to write log file: No space left on device",
        );
    } else {
        t.log(LogLevel::Warn, format!("Disk space warning: {disk:.0}% used"));
    }
    t
}

pub(crate) fn connection_leak(
    service: &ServiceProfile,
    pod: &str,
    elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    let connections = t.record(
        Metric::DbConnections,
        DB_NAME,
        (f64::from(service.base_connections()) + (elapsed / 2) as f64).min(150.0),
    );
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 0, 10));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 10, 25));

    t.log(
        LogLevel::Warn,
        format!("Database connection count increasing: {connections:.0}"),
    );
    t.log(LogLevel::Error, "Connection pool leak detected");
    if connections > 100.0 {
        t.log(LogLevel::Error, "New connection requests being rejected");
    }
    t
}

pub(crate) fn queue_backlog(
    service: &ServiceProfile,
    pod: &str,
    elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    let depth = t.record(
        Metric::QueueDepth,
        QUEUE_NAME,
        (100.0 + elapsed.saturating_mul(5) as f64).min(10_000.0),
    );
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 5, 20));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 5, 15));

    t.log(LogLevel::Warn, format!("Queue depth growing: {depth:.0} messages"));
    if depth >= 1000.0 {
        t.log(LogLevel::Error, "Message processing lag detected");
    }
    if depth > 5000.0 {
        t.log(
            LogLevel::Error,
            "Queue backlog critical - potential data loss",
        );
    }
    t
}

pub(crate) fn gc_pressure(
    service: &ServiceProfile,
    pod: &str,
    _elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 15, 35));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 10, 25));
    let gc = t.record(Metric::GcTime, "major", rng.int_in(200, 1000) as f64);
    t.record(Metric::ResponseTime, API_ENDPOINT, rng.float_in(1.0, 5.0));

    t.log(
        LogLevel::Warn,
        format!("Frequent garbage collection events (duration: {gc:.0}ms)"),
    );
    t.log(LogLevel::Warn, "Application pause time increasing");
    t.log(LogLevel::Error, "GC pressure affecting response times");
    t
}

pub(crate) fn error_burst(
    service: &ServiceProfile,
    pod: &str,
    _elapsed: u64,
    rng: &mut dyn RandomSource,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, 0, 15));
    t.record(Metric::MemoryUsage, pod, offset(service.base_memory(), rng, 0, 15));
    t.record(Metric::ErrorRate, "4xx", rng.int_in(10, 50) as f64);

    let bursts = rng.int_in(1, 3);
    for _ in 0..bursts {
        let message = ERROR_BURST_MESSAGES[rng.pick(ERROR_BURST_MESSAGES.len())];
        t.log(LogLevel::Error, message);
    }
    t
}

/// Baseline telemetry for a pod with no active fault
pub fn generate_normal(
    service: &ServiceProfile,
    pod: &str,
    rng: &mut dyn RandomSource,
    log_probability: f64,
) -> Telemetry {
    let mut t = Telemetry::new();
    t.record(Metric::CpuUsage, pod, offset(service.base_cpu(), rng, -5, 10).max(1.0));
    t.record(
        Metric::MemoryUsage,
        pod,
        offset(service.base_memory(), rng, -5, 10).max(1.0),
    );

    if service.category() == ServiceCategory::Database {
        t.record(
            Metric::DbConnections,
            DB_NAME,
            offset(service.base_connections(), rng, -5, 5),
        );
    }

    if rng.chance(log_probability) {
        let message = match rng.pick(4) {
            0 => "Health check completed successfully".to_string(),
            1 => format!("Processed {} requests in last minute", rng.int_in(10, 100)),
            2 => "Service startup completed".to_string(),
            _ => "Configuration reloaded".to_string(),
        };
        t.log(LogLevel::Info, message);
    }
    t
}
