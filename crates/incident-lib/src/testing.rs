//! In-memory collaborators for exercising the simulator without I/O
//!
//! Scripted randomness, a manually advanced clock, recording sinks and
//! sinks that always fail.

use crate::error::{SinkError, SinkResult};
use crate::models::IncidentId;
use crate::rng::RandomSource;
use crate::simulation::Clock;
use crate::telemetry::{
    IncidentStatus, IncidentStore, Labels, LogEntry, LogSink, MetricRecord, MetricsSink,
    NewIncident,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Random source replaying a fixed sequence of draws
///
/// Once the script is exhausted every draw returns the fallback value.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    draws: VecDeque<f64>,
    fallback: f64,
    taken: usize,
}

impl ScriptedRandom {
    /// Replay `draws`, then return 0.5 forever
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback: 0.5,
            taken: 0,
        }
    }

    /// Return `value` for every draw
    pub fn constant(value: f64) -> Self {
        Self {
            draws: VecDeque::new(),
            fallback: value,
            taken: 0,
        }
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    /// Number of draws made so far
    pub fn draws_taken(&self) -> usize {
        self.taken
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        self.taken += 1;
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// A metric value captured by [`RecordingMetricsSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
}

#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    gauges: Mutex<Vec<RecordedMetric>>,
    histograms: Mutex<Vec<RecordedMetric>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauges(&self) -> Vec<RecordedMetric> {
        lock(&self.gauges).clone()
    }

    pub fn histograms(&self) -> Vec<RecordedMetric> {
        lock(&self.histograms).clone()
    }

    /// Every gauge and histogram value recorded under `name`
    pub fn values_of(&self, name: &str) -> Vec<f64> {
        lock(&self.gauges)
            .iter()
            .chain(lock(&self.histograms).iter())
            .filter(|m| m.name == name)
            .map(|m| m.value)
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_gauge(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()> {
        lock(&self.gauges).push(RecordedMetric {
            name: name.to_string(),
            labels: labels.clone(),
            value,
        });
        Ok(())
    }

    fn record_histogram(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()> {
        lock(&self.histograms).push(RecordedMetric {
            name: name.to_string(),
            labels: labels.clone(),
            value,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn push_log(&self, entry: &LogEntry) -> SinkResult<()> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }
}

/// Log sink rejecting every push
#[derive(Debug, Default)]
pub struct FailingLogSink;

#[async_trait]
impl LogSink for FailingLogSink {
    async fn push_log(&self, _entry: &LogEntry) -> SinkResult<()> {
        Err(SinkError::Status {
            status: 503,
            body: "log sink unavailable".to_string(),
        })
    }
}

/// Log sink that never answers, for exercising call timeouts
#[derive(Debug, Default)]
pub struct StalledLogSink;

#[async_trait]
impl LogSink for StalledLogSink {
    async fn push_log(&self, _entry: &LogEntry) -> SinkResult<()> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    incidents: Vec<(IncidentId, NewIncident)>,
    statuses: HashMap<IncidentId, IncidentStatus>,
    metrics: Vec<MetricRecord>,
    logs: Vec<LogEntry>,
}

/// Incident store keeping every write in memory
#[derive(Debug, Default)]
pub struct RecordingIncidentStore {
    state: Mutex<StoreState>,
    closed: AtomicBool,
}

impl RecordingIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incidents(&self) -> Vec<NewIncident> {
        lock(&self.state)
            .incidents
            .iter()
            .map(|(_, incident)| incident.clone())
            .collect()
    }

    pub fn incident_ids(&self) -> Vec<IncidentId> {
        lock(&self.state)
            .incidents
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn status_of(&self, id: &IncidentId) -> Option<IncidentStatus> {
        lock(&self.state).statuses.get(id).copied()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        lock(&self.state).metrics.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.state).logs.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncidentStore for RecordingIncidentStore {
    async fn create_incident(&self, incident: &NewIncident) -> SinkResult<IncidentId> {
        let mut state = lock(&self.state);
        let id = IncidentId::new(format!("incident-{}", state.incidents.len() + 1));
        state.incidents.push((id.clone(), incident.clone()));
        state.statuses.insert(id.clone(), IncidentStatus::Active);
        Ok(id)
    }

    async fn update_incident_status(
        &self,
        id: &IncidentId,
        status: IncidentStatus,
        _end_time: Option<DateTime<Utc>>,
    ) -> SinkResult<()> {
        let mut state = lock(&self.state);
        match state.statuses.get_mut(id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(SinkError::InvalidIncidentId(id.to_string())),
        }
    }

    async fn insert_metric(&self, record: &MetricRecord) -> SinkResult<()> {
        lock(&self.state).metrics.push(record.clone());
        Ok(())
    }

    async fn insert_log(&self, entry: &LogEntry) -> SinkResult<()> {
        lock(&self.state).logs.push(entry.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Incident store whose every call fails
#[derive(Debug, Default)]
pub struct FailingIncidentStore {
    calls: AtomicUsize,
}

impl FailingIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls attempted
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> SinkResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Unavailable("database is down".to_string()))
    }
}

#[async_trait]
impl IncidentStore for FailingIncidentStore {
    async fn create_incident(&self, _incident: &NewIncident) -> SinkResult<IncidentId> {
        self.fail()
    }

    async fn update_incident_status(
        &self,
        _id: &IncidentId,
        _status: IncidentStatus,
        _end_time: Option<DateTime<Utc>>,
    ) -> SinkResult<()> {
        self.fail()
    }

    async fn insert_metric(&self, _record: &MetricRecord) -> SinkResult<()> {
        self.fail()
    }

    async fn insert_log(&self, _entry: &LogEntry) -> SinkResult<()> {
        self.fail()
    }
}
