//! Built-in fault patterns
//!
//! Declaration order matters: the state machine walks patterns in this order
//! and the first successful draw wins.

use super::{FaultKind, FaultPattern};

pub fn default_patterns() -> Vec<FaultPattern> {
    vec![
        FaultPattern::new(
            FaultKind::MemoryLeak,
            (120, 600),
            0.15,
            &["user-api", "payment-service", "order-processor"],
        ),
        FaultPattern::new(
            FaultKind::CpuSpike,
            (60, 300),
            0.20,
            &["user-api", "payment-service", "search-engine"],
        ),
        FaultPattern::new(FaultKind::DatabaseSlow, (90, 450), 0.12, &["user-db"]),
        FaultPattern::new(
            FaultKind::NetworkLatency,
            (60, 240),
            0.18,
            &["user-api", "payment-service"],
        ),
        FaultPattern::new(
            FaultKind::DiskFull,
            (180, 900),
            0.08,
            &["user-db", "search-engine"],
        ),
        FaultPattern::new(
            FaultKind::ConnectionLeak,
            (120, 480),
            0.10,
            &["user-api", "payment-service", "user-db"],
        ),
        FaultPattern::new(
            FaultKind::QueueBacklog,
            (90, 360),
            0.14,
            &["message-queue", "order-processor"],
        ),
        FaultPattern::new(
            FaultKind::GcPressure,
            (90, 420),
            0.16,
            &["user-api", "payment-service", "search-engine"],
        ),
        FaultPattern::new(
            FaultKind::ErrorBurst,
            (30, 180),
            0.22,
            &["user-api", "payment-service", "order-processor"],
        ),
    ]
}
