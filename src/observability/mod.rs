//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (usage counters, TLS failures, request counts)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;

pub use self::metrics::{override_metrics_verb, MetricGeneration, UsageTelemetry, UsageType};
