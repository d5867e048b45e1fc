//! Tests for the fault pattern library
//!
//! These tests verify:
//! - Staged log escalation keyed to elapsed time
//! - Growth formulas and their ceilings
//! - Every generator output stays within documented bounds

use super::generators::*;
use super::*;
use crate::fleet::default_services;
use crate::models::{ServiceCategory, ServiceProfile};
use crate::rng::StdRandom;
use crate::testing::ScriptedRandom;

/// Service with baseline CPU 20, memory 40, connections 10
fn web_service() -> ServiceProfile {
    ServiceProfile::new("user-api", ServiceCategory::Web, ["user-api-1"])
}

mod kind_tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in FaultKind::ALL {
            assert_eq!(kind.as_str().parse::<FaultKind>().unwrap(), kind);
        }
        assert_eq!(
            "meteor_strike".parse::<FaultKind>(),
            Err(ParseFaultKindError("meteor_strike".to_string()))
        );
    }

    #[test]
    fn test_titles_and_severities() {
        assert_eq!(FaultKind::MemoryLeak.title(), "Memory Leak");
        assert_eq!(FaultKind::GcPressure.title(), "Gc Pressure");
        assert_eq!(FaultKind::DatabaseSlow.severity(), Severity::Critical);
        assert_eq!(FaultKind::DiskFull.severity(), Severity::Critical);
        assert_eq!(FaultKind::ErrorBurst.severity(), Severity::High);
        assert_eq!(FaultKind::QueueBacklog.severity(), Severity::Medium);
    }

    #[test]
    fn test_default_patterns_cover_every_kind_in_order() {
        let kinds: Vec<FaultKind> = default_patterns().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, FaultKind::ALL.to_vec());

        let patterns = default_patterns();
        assert!(patterns[2].applies_to("user-db"));
        assert!(!patterns[2].applies_to("user-api"));
    }
}

mod generator_tests {
    use super::*;

    #[test]
    fn test_memory_leak_unresponsive_stage() {
        let mut rng = ScriptedRandom::constant(0.5);
        let t = memory_leak(&web_service(), "user-api-1", 150, &mut rng);

        assert_eq!(t.value_of(Metric::MemoryUsage), Some(70.0));
        assert_eq!(t.logs.len(), 2);
        assert!(t.logs.iter().all(|l| l.level == LogLevel::Error));
        assert!(t.logs[1].message.contains("unresponsive"));
    }

    #[test]
    fn test_memory_leak_stages() {
        let mut rng = ScriptedRandom::constant(0.5);
        let early = memory_leak(&web_service(), "p", 10, &mut rng);
        assert_eq!(early.max_level(), Some(LogLevel::Warn));
        assert_eq!(early.value_of(Metric::MemoryUsage), Some(42.0));

        let middle = memory_leak(&web_service(), "p", 60, &mut rng);
        assert!(middle.logs[0].message.starts_with("OutOfMemoryError"));
        assert_eq!(middle.logs[1].level, LogLevel::Warn);
    }

    #[test]
    fn test_memory_leak_growth_caps() {
        let mut rng = ScriptedRandom::constant(0.5);
        let heavy = ServiceProfile::new("x", ServiceCategory::Web, ["p"]).with_baseline(20, 80);
        let t = memory_leak(&heavy, "p", 10_000, &mut rng);
        assert_eq!(t.value_of(Metric::MemoryUsage), Some(98.0));
    }

    #[test]
    fn test_disk_full_threshold() {
        let mut rng = ScriptedRandom::constant(0.5);
        let warning = disk_full(&web_service(), "p", 100, &mut rng);
        assert_eq!(warning.value_of(Metric::DiskUsage), Some(80.0));
        assert_eq!(warning.max_level(), Some(LogLevel::Warn));

        let critical = disk_full(&web_service(), "p", 200, &mut rng);
        assert_eq!(critical.value_of(Metric::DiskUsage), Some(90.0));
        assert_eq!(critical.logs.len(), 2);
        assert_eq!(critical.max_level(), Some(LogLevel::Error));

        let capped = disk_full(&web_service(), "p", 100_000, &mut rng);
        assert_eq!(capped.value_of(Metric::DiskUsage), Some(99.0));
    }

    #[test]
    fn test_queue_backlog_stages() {
        let mut rng = ScriptedRandom::constant(0.5);
        let start = queue_backlog(&web_service(), "p", 0, &mut rng);
        assert_eq!(start.value_of(Metric::QueueDepth), Some(100.0));
        assert_eq!(start.logs.len(), 1);

        let lagging = queue_backlog(&web_service(), "p", 180, &mut rng);
        assert_eq!(lagging.value_of(Metric::QueueDepth), Some(1000.0));
        assert_eq!(lagging.logs.len(), 2);

        let critical = queue_backlog(&web_service(), "p", 2000, &mut rng);
        assert_eq!(critical.value_of(Metric::QueueDepth), Some(10_000.0));
        assert_eq!(critical.logs.len(), 3);
        assert!(critical.logs[2].message.contains("data loss"));
    }

    #[test]
    fn test_connection_leak_rejects_above_hundred() {
        let mut rng = ScriptedRandom::constant(0.5);
        let moderate = connection_leak(&web_service(), "p", 100, &mut rng);
        assert_eq!(moderate.value_of(Metric::DbConnections), Some(60.0));
        assert_eq!(moderate.logs.len(), 2);

        let severe = connection_leak(&web_service(), "p", 1000, &mut rng);
        assert_eq!(severe.value_of(Metric::DbConnections), Some(150.0));
        assert_eq!(severe.logs.len(), 3);
    }

    #[test]
    fn test_database_slow_reports_pool_usage() {
        let db = ServiceProfile::new("user-db", ServiceCategory::Database, ["user-db-1"])
            .with_connections(50);
        let mut rng = ScriptedRandom::constant(0.0);
        let t = database_slow(&db, "user-db-1", 90, &mut rng);

        assert_eq!(t.value_of(Metric::DbConnections), Some(80.0));
        assert!(t.logs[1].message.ends_with("80/200"));
        let response = t.value_of(Metric::ResponseTime).unwrap();
        assert!((5.0..15.0).contains(&response));
    }

    #[test]
    fn test_cpu_spike_saturates() {
        let mut rng = ScriptedRandom::constant(0.0);
        let t = cpu_spike(&web_service(), "p", 0, &mut rng);
        assert_eq!(t.value_of(Metric::CpuUsage), Some(91.0));
        assert_eq!(t.logs.len(), 3);
    }

    #[test]
    fn test_error_burst_message_count() {
        // cpu, memory, error rate, then a burst count of 3
        let mut rng = ScriptedRandom::new([0.0, 0.0, 0.0, 0.99]);
        let t = error_burst(&web_service(), "p", 0, &mut rng);
        assert_eq!(t.logs.len(), 3);
        assert!(t.logs.iter().all(|l| l.message.starts_with("HTTP ")));

        let mut rng = ScriptedRandom::constant(0.0);
        let single = error_burst(&web_service(), "p", 0, &mut rng);
        assert_eq!(single.logs.len(), 1);
    }

    #[test]
    fn test_normal_generation_floors_at_one() {
        let idle = ServiceProfile::new("idle", ServiceCategory::Cache, ["p"]).with_baseline(2, 3);
        let mut rng = ScriptedRandom::constant(0.0);
        let t = generate_normal(&idle, "p", &mut rng, 0.0);

        assert_eq!(t.value_of(Metric::CpuUsage), Some(1.0));
        assert_eq!(t.value_of(Metric::MemoryUsage), Some(1.0));
        assert_eq!(t.value_of(Metric::DbConnections), None);
        assert!(t.logs.is_empty());
    }

    #[test]
    fn test_normal_generation_for_database() {
        let db = ServiceProfile::new("user-db", ServiceCategory::Database, ["user-db-1"])
            .with_connections(50);
        let mut rng = ScriptedRandom::constant(0.0);
        let t = generate_normal(&db, "user-db-1", &mut rng, 1.0);

        assert_eq!(t.value_of(Metric::DbConnections), Some(45.0));
        assert_eq!(t.logs.len(), 1);
        assert_eq!(t.logs[0].level, LogLevel::Info);
    }

    #[test]
    fn test_generator_table_dispatch() {
        let table = GeneratorTable::standard().without(FaultKind::GcPressure);
        let mut rng = ScriptedRandom::constant(0.5);

        assert!(table
            .generate(FaultKind::GcPressure, &web_service(), "p", 0, &mut rng)
            .is_none());
        assert!(table
            .generate(FaultKind::CpuSpike, &web_service(), "p", 0, &mut rng)
            .is_some());
        assert!(GeneratorTable::empty().get(FaultKind::CpuSpike).is_none());
    }
}

mod bounds_tests {
    use super::*;

    #[test]
    fn test_clamp_handles_out_of_range_and_nan() {
        assert_eq!(Metric::MemoryUsage.clamp(120.0), 98.0);
        assert_eq!(Metric::CpuUsage.clamp(-4.0), 1.0);
        assert_eq!(Metric::QueueDepth.clamp(f64::NAN), 0.0);
        assert_eq!(Metric::from_name("service_gc_time_ms"), Some(Metric::GcTime));
        assert_eq!(Metric::from_name("service_request_rate"), None);
    }

    #[test]
    fn test_all_generators_stay_within_bounds() {
        let table = GeneratorTable::standard();
        let mut rng = StdRandom::seeded(1234);
        let elapsed_samples = [0, 1, 29, 30, 119, 120, 199, 200, 1000, 3600, 100_000];

        for service in default_services() {
            let pod = service.pods()[0].clone();
            for kind in FaultKind::ALL {
                for elapsed in elapsed_samples {
                    let t = table
                        .generate(kind, &service, &pod, elapsed, &mut rng)
                        .unwrap();
                    assert!(!t.is_empty());
                    for obs in &t.observations {
                        let (lo, hi) = obs.metric.bounds();
                        assert!(
                            obs.value >= lo && obs.value <= hi,
                            "{kind} on {} produced {} = {}",
                            service.name(),
                            obs.metric,
                            obs.value
                        );
                    }
                    if kind == FaultKind::QueueBacklog {
                        let depth = t.value_of(Metric::QueueDepth).unwrap();
                        assert!((100.0..=10_000.0).contains(&depth));
                    }
                }
            }

            for _ in 0..50 {
                let t = generate_normal(&service, &pod, &mut rng, DEFAULT_NORMAL_LOG_PROBABILITY);
                assert!(t.observations.iter().all(|o| {
                    let (lo, hi) = o.metric.bounds();
                    o.value >= lo && o.value <= hi
                }));
            }
        }
    }

    #[test]
    fn test_observation_labels() {
        let mut t = Telemetry::new();
        t.record(Metric::QueueDepth, "user_events", 10.0);
        let labels = t.observations[0].labels("message-queue");
        assert_eq!(labels.get("service").map(String::as_str), Some("message-queue"));
        assert_eq!(labels.get("queue_name").map(String::as_str), Some("user_events"));
    }
}
