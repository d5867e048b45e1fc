//! Incident state machine
//!
//! Decides, once per service per tick, whether a synthetic fault starts or
//! ends. Each service moves `idle -> active(kind, start, duration) -> idle`;
//! fleet-wide safety ceilings veto new faults.

use crate::fault::FaultPattern;
use crate::fleet::{FleetState, HaltReason};
use crate::models::ServiceProfile;
use crate::rng::RandomSource;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

/// Safety ceilings applied across the whole fleet
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyLimits {
    /// Maximum services with an active fault at once
    pub max_concurrent: usize,
    /// Run time after which no new faults start
    pub max_runtime: Duration,
    /// Total faults after which no new faults start
    pub max_total: u64,
    /// Faults older than this are force-ended regardless of planned duration
    pub fault_timeout: Duration,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_runtime: Duration::from_secs(8 * 3600),
            max_total: 50,
            fault_timeout: Duration::from_secs(3600),
        }
    }
}

/// Start/end decisions for simulated faults
#[derive(Debug, Clone)]
pub struct IncidentStateMachine {
    patterns: Vec<FaultPattern>,
    limits: SafetyLimits,
}

impl IncidentStateMachine {
    pub fn new(patterns: Vec<FaultPattern>, limits: SafetyLimits) -> Self {
        Self { patterns, limits }
    }

    pub fn patterns(&self) -> &[FaultPattern] {
        &self.patterns
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Decide whether the service at `index` starts a fault this tick
    ///
    /// Vetoes apply in order: service already faulted, fleet at the
    /// concurrency cap, run time ceiling, total fault ceiling. The last two
    /// disable generation for the rest of the run. Otherwise patterns are
    /// tried in declaration order and the first successful draw wins; only
    /// patterns the service is eligible for consume a draw. A selection
    /// increments the fleet's total counter and returns the matched pattern,
    /// which carries the duration range for the new fault.
    pub fn decide_start(
        &self,
        fleet: &mut FleetState,
        index: usize,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Option<&FaultPattern> {
        let service = fleet.service(index)?;
        if service.has_active_fault() {
            return None;
        }
        let name = service.name().to_string();

        if fleet.active_count() >= self.limits.max_concurrent {
            return None;
        }

        if fleet.halted().is_some() {
            return None;
        }

        if fleet.uptime(now) > self.limits.max_runtime {
            warn!(
                event = "generation_halted",
                reason = %HaltReason::RuntimeLimit,
                runtime_secs = fleet.uptime(now).as_secs(),
                "Runtime limit reached - stopping fault generation"
            );
            fleet.halt(HaltReason::RuntimeLimit);
            return None;
        }

        if fleet.total_generated() > self.limits.max_total {
            warn!(
                event = "generation_halted",
                reason = %HaltReason::FaultLimit,
                total_generated = fleet.total_generated(),
                "Fault limit reached - stopping fault generation"
            );
            fleet.halt(HaltReason::FaultLimit);
            return None;
        }

        let selected = self
            .patterns
            .iter()
            .filter(|pattern| pattern.applies_to(&name))
            .find(|pattern| rng.next_f64() < pattern.probability)?;

        fleet.record_generated();
        Some(selected)
    }

    /// Decide whether the service's current fault ends now
    ///
    /// True for a fault with no start time, for one older than the safety
    /// timeout, and for one that has reached its planned duration.
    pub fn decide_end(&self, service: &ServiceProfile, now: DateTime<Utc>) -> bool {
        let fault = service.fault();
        if !fault.is_active() {
            return false;
        }

        let Some(started_at) = fault.started_at() else {
            warn!(
                event = "fault_force_ended",
                service = %service.name(),
                reason = "missing_start_time",
                "Force ending fault with no start time"
            );
            return true;
        };

        let elapsed = (now - started_at).num_seconds();
        if elapsed > saturating_secs(self.limits.fault_timeout.as_secs()) {
            warn!(
                event = "fault_force_ended",
                service = %service.name(),
                reason = "safety_timeout",
                elapsed_secs = elapsed,
                "Force ending long-running fault"
            );
            return true;
        }

        elapsed >= saturating_secs(fault.duration_secs())
    }

    /// Draw a planned duration, uniform over the pattern's inclusive range
    pub fn planned_duration(&self, pattern: &FaultPattern, rng: &mut dyn RandomSource) -> u64 {
        let drawn = rng.int_in(
            saturating_secs(pattern.min_duration_secs),
            saturating_secs(pattern.max_duration_secs),
        );
        u64::try_from(drawn).unwrap_or(0)
    }
}

fn saturating_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{default_patterns, FaultKind};
    use crate::fleet::default_services;
    use crate::models::{FaultState, ServiceCategory};
    use crate::testing::ScriptedRandom;
    use chrono::Duration as ChronoDuration;

    const USER_API: usize = 0;
    const PAYMENT: usize = 1;
    const ORDER: usize = 2;
    const SEARCH: usize = 3;
    const REDIS: usize = 5;

    fn machine() -> IncidentStateMachine {
        IncidentStateMachine::new(default_patterns(), SafetyLimits::default())
    }

    fn fleet(now: DateTime<Utc>) -> FleetState {
        FleetState::new(default_services(), now)
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        // user-api: memory_leak (0.15) misses, cpu_spike (0.20) hits
        let mut rng = ScriptedRandom::new([0.5, 0.1]);

        let kind = machine()
            .decide_start(&mut fleet, USER_API, now, &mut rng)
            .map(|p| p.kind);

        assert_eq!(kind, Some(FaultKind::CpuSpike));
        assert_eq!(fleet.total_generated(), 1);
        assert_eq!(rng.draws_taken(), 2);
    }

    #[test]
    fn test_declaration_order_beats_probability() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        // A draw of 0.1 is below both memory_leak (0.15) and error_burst (0.22)
        let mut rng = ScriptedRandom::new([0.1]);

        let kind = machine()
            .decide_start(&mut fleet, USER_API, now, &mut rng)
            .map(|p| p.kind);
        assert_eq!(kind, Some(FaultKind::MemoryLeak));
    }

    #[test]
    fn test_ineligible_patterns_consume_no_draws() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        // search-engine is eligible for cpu_spike, disk_full, gc_pressure only
        let mut rng = ScriptedRandom::new([0.9, 0.05]);

        let kind = machine()
            .decide_start(&mut fleet, SEARCH, now, &mut rng)
            .map(|p| p.kind);
        assert_eq!(kind, Some(FaultKind::DiskFull));
    }

    #[test]
    fn test_no_pattern_for_service() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        let mut rng = ScriptedRandom::new([0.0]);

        assert_eq!(machine().decide_start(&mut fleet, REDIS, now, &mut rng), None);
        assert_eq!(rng.draws_taken(), 0);
        assert_eq!(fleet.total_generated(), 0);
    }

    #[test]
    fn test_all_draws_miss() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        let mut rng = ScriptedRandom::constant(0.99);

        assert_eq!(machine().decide_start(&mut fleet, USER_API, now, &mut rng), None);
        assert_eq!(fleet.total_generated(), 0);
    }

    #[test]
    fn test_veto_when_service_already_faulted() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        fleet
            .service_mut(USER_API)
            .unwrap()
            .begin_fault(FaultKind::ErrorBurst, now, 60);
        let mut rng = ScriptedRandom::constant(0.0);

        assert_eq!(machine().decide_start(&mut fleet, USER_API, now, &mut rng), None);
        assert_eq!(fleet.total_generated(), 0);
        assert_eq!(rng.draws_taken(), 0);
    }

    #[test]
    fn test_veto_at_concurrency_cap() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        for index in [USER_API, PAYMENT, ORDER] {
            fleet
                .service_mut(index)
                .unwrap()
                .begin_fault(FaultKind::ErrorBurst, now, 60);
        }
        // The draw would succeed for search-engine
        let mut rng = ScriptedRandom::constant(0.0);

        assert_eq!(machine().decide_start(&mut fleet, SEARCH, now, &mut rng), None);
        assert_eq!(fleet.total_generated(), 0);
        // Concurrency is not a permanent halt
        assert_eq!(fleet.halted(), None);
    }

    #[test]
    fn test_runtime_ceiling_disables_future_starts() {
        let start = Utc::now();
        let mut fleet = fleet(start);
        let mut rng = ScriptedRandom::constant(0.0);
        let m = machine();

        let late = start + ChronoDuration::hours(8) + ChronoDuration::seconds(1);
        assert_eq!(m.decide_start(&mut fleet, USER_API, late, &mut rng), None);
        assert_eq!(fleet.halted(), Some(HaltReason::RuntimeLimit));

        // Even a time within the window no longer starts faults
        assert_eq!(m.decide_start(&mut fleet, USER_API, start, &mut rng), None);
        assert_eq!(fleet.total_generated(), 0);
    }

    #[test]
    fn test_runtime_exactly_at_ceiling_still_starts() {
        let start = Utc::now();
        let mut fleet = fleet(start);
        let mut rng = ScriptedRandom::constant(0.0);

        let at_limit = start + ChronoDuration::hours(8);
        assert!(machine()
            .decide_start(&mut fleet, USER_API, at_limit, &mut rng)
            .is_some());
    }

    #[test]
    fn test_total_ceiling_disables_future_starts() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        let limits = SafetyLimits {
            max_total: 2,
            ..SafetyLimits::default()
        };
        let m = IncidentStateMachine::new(default_patterns(), limits);
        let mut rng = ScriptedRandom::constant(0.0);

        // Counter may reach max_total + 1 before the ceiling is "exceeded"
        for _ in 0..3 {
            assert!(m.decide_start(&mut fleet, USER_API, now, &mut rng).is_some());
        }
        assert_eq!(fleet.total_generated(), 3);

        assert_eq!(m.decide_start(&mut fleet, USER_API, now, &mut rng), None);
        assert_eq!(fleet.halted(), Some(HaltReason::FaultLimit));
        assert_eq!(fleet.total_generated(), 3);
    }

    #[test]
    fn test_decide_end_idle_service() {
        let now = Utc::now();
        let fleet = fleet(now);
        assert!(!machine().decide_end(&fleet.services()[USER_API], now));
    }

    #[test]
    fn test_decide_end_on_planned_duration() {
        let start = Utc::now();
        let mut fleet = fleet(start);
        let service = fleet.service_mut(USER_API).unwrap();
        service.begin_fault(FaultKind::CpuSpike, start, 60);
        let m = machine();

        assert!(!m.decide_end(service, start + ChronoDuration::seconds(59)));
        assert!(m.decide_end(service, start + ChronoDuration::seconds(60)));
        assert!(m.decide_end(service, start + ChronoDuration::seconds(3601)));
    }

    #[test]
    fn test_decide_end_forces_after_safety_timeout() {
        let start = Utc::now();
        let mut fleet = fleet(start);
        let service = fleet.service_mut(USER_API).unwrap();
        service.begin_fault(FaultKind::DiskFull, start, 5000);
        let m = machine();

        assert!(!m.decide_end(service, start + ChronoDuration::seconds(3600)));
        assert!(m.decide_end(service, start + ChronoDuration::seconds(3601)));
    }

    #[test]
    fn test_decide_end_heals_missing_start_time() {
        let now = Utc::now();
        let mut fleet = fleet(now);
        let service = fleet.service_mut(USER_API).unwrap();
        service.set_fault_state(FaultState::corrupted(FaultKind::MemoryLeak));

        assert!(machine().decide_end(service, now));
    }

    #[test]
    fn test_decide_end_with_unbounded_duration() {
        let start = Utc::now();
        let mut fleet = fleet(start);
        let service = fleet.service_mut(USER_API).unwrap();
        service.begin_fault(FaultKind::DiskFull, start, u64::MAX);
        let limits = SafetyLimits {
            fault_timeout: Duration::from_secs(u64::MAX),
            ..SafetyLimits::default()
        };
        let m = IncidentStateMachine::new(default_patterns(), limits);

        assert!(!m.decide_end(service, start + ChronoDuration::days(365)));
    }

    #[test]
    fn test_planned_duration_within_range() {
        let m = machine();
        let memory_leak = &m.patterns()[0];
        let error_burst = m
            .patterns()
            .iter()
            .find(|p| p.kind == FaultKind::ErrorBurst)
            .unwrap();
        let mut low = ScriptedRandom::constant(0.0);
        let mut high = ScriptedRandom::constant(0.999_999);

        assert_eq!(m.planned_duration(memory_leak, &mut low), 120);
        assert_eq!(m.planned_duration(memory_leak, &mut high), 600);
        assert_eq!(m.planned_duration(error_burst, &mut low), 30);
    }

    #[test]
    fn test_planned_duration_saturates_huge_range() {
        let m = machine();
        let pattern =
            FaultPattern::new(FaultKind::DiskFull, (u64::MAX - 1, u64::MAX), 0.5, &["svc"]);
        let mut rng = ScriptedRandom::constant(0.5);

        assert_eq!(m.planned_duration(&pattern, &mut rng), i64::MAX as u64);
    }

    #[test]
    fn test_duration_comes_from_matched_pattern() {
        let now = Utc::now();
        let services = vec![
            ServiceProfile::new("a", ServiceCategory::Web, ["a-1"]),
            ServiceProfile::new("b", ServiceCategory::Web, ["b-1"]),
        ];
        let mut fleet = FleetState::new(services, now);
        let m = IncidentStateMachine::new(
            vec![
                FaultPattern::new(FaultKind::MemoryLeak, (10, 10), 1.0, &["a"]),
                FaultPattern::new(FaultKind::MemoryLeak, (500, 500), 1.0, &["b"]),
            ],
            SafetyLimits::default(),
        );
        let mut rng = ScriptedRandom::constant(0.0);

        let pattern = m.decide_start(&mut fleet, 1, now, &mut rng).unwrap();
        assert_eq!(pattern.kind, FaultKind::MemoryLeak);
        assert_eq!(m.planned_duration(pattern, &mut rng), 500);

        let pattern = m.decide_start(&mut fleet, 0, now, &mut rng).unwrap();
        assert_eq!(m.planned_duration(pattern, &mut rng), 10);
    }
}
