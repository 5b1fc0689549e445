//! Metrics collection and exposition.
//!
//! # Metrics
//! - `log_relay_insecure_backend_total{usage}` (counter): requests by TLS
//!   verification decision, `usage` is `enforce_tls` or `skip_tls_allowed`
//! - `log_relay_backend_tls_failure_total` (counter): agent connections that
//!   failed certificate verification
//! - `log_relay_logs_insecure_backend_total{usage}` and
//!   `log_relay_logs_backend_tls_failure_total`: deprecated names, still
//!   served until dashboards migrate
//! - `log_relay_requests_total{verb,code}` (counter): log requests, with
//!   GET reported as CONNECT
//! - `log_relay_active_streams` (gauge): streams currently being copied
//!
//! Every increment also lands in an in-process atomic so tests and the
//! status endpoint can read counts without scraping.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const INSECURE_BACKEND_TOTAL: &str = "log_relay_insecure_backend_total";
pub const BACKEND_TLS_FAILURE_TOTAL: &str = "log_relay_backend_tls_failure_total";
pub const DEPRECATED_INSECURE_BACKEND_TOTAL: &str = "log_relay_logs_insecure_backend_total";
pub const DEPRECATED_BACKEND_TLS_FAILURE_TOTAL: &str = "log_relay_logs_backend_tls_failure_total";
pub const REQUESTS_TOTAL: &str = "log_relay_requests_total";
pub const ACTIVE_STREAMS: &str = "log_relay_active_streams";

static REGISTER: Once = Once::new();

/// TLS verification decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageType {
    Enforce,
    SkipAllowed,
}

impl UsageType {
    pub fn from_skip(skip: bool) -> Self {
        if skip {
            UsageType::SkipAllowed
        } else {
            UsageType::Enforce
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Enforce => "enforce_tls",
            UsageType::SkipAllowed => "skip_tls_allowed",
        }
    }

    fn index(&self) -> usize {
        match self {
            UsageType::Enforce => 0,
            UsageType::SkipAllowed => 1,
        }
    }
}

/// Metric naming generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricGeneration {
    Current,
    Deprecated,
}

impl MetricGeneration {
    fn index(&self) -> usize {
        match self {
            MetricGeneration::Current => 0,
            MetricGeneration::Deprecated => 1,
        }
    }
}

/// The verb reported to metrics for a log request. A log read is a
/// long-lived stream, so GET is reported as CONNECT.
pub fn override_metrics_verb(verb: &str) -> &str {
    if verb == "GET" {
        "CONNECT"
    } else {
        verb
    }
}

/// Describe all metrics with the recorder. Runs its body once per process.
pub fn register() {
    REGISTER.call_once(|| {
        describe_counter!(
            INSECURE_BACKEND_TOTAL,
            "Number of log requests, split by whether agent TLS verification was enforced or skipped"
        );
        describe_counter!(
            DEPRECATED_INSECURE_BACKEND_TOTAL,
            "Deprecated: use log_relay_insecure_backend_total"
        );
        describe_counter!(
            BACKEND_TLS_FAILURE_TOTAL,
            "Number of agent connections that failed TLS verification"
        );
        describe_counter!(
            DEPRECATED_BACKEND_TLS_FAILURE_TOTAL,
            "Deprecated: use log_relay_backend_tls_failure_total"
        );
        describe_counter!(REQUESTS_TOTAL, "Number of log requests by verb and status code");
        describe_gauge!(ACTIVE_STREAMS, "Number of log streams currently being forwarded");
    });
}

/// Install the Prometheus exporter. Failure is logged, never fatal.
pub fn init_exporter(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            register();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Injectable telemetry handle shared by every request.
#[derive(Debug, Default)]
pub struct UsageTelemetry {
    usage: [[AtomicU64; 2]; 2],
    tls_failures: [AtomicU64; 2],
    requests: DashMap<(String, u16), u64>,
}

impl UsageTelemetry {
    /// Create a handle. Metric descriptions are registered on first use.
    pub fn new() -> Self {
        register();
        Self::default()
    }

    /// Count one request's TLS verification decision in both generations.
    pub fn record_skip_decision(&self, skip: bool) {
        let usage = UsageType::from_skip(skip);
        counter!(INSECURE_BACKEND_TOTAL, "usage" => usage.as_str()).increment(1);
        counter!(DEPRECATED_INSECURE_BACKEND_TOTAL, "usage" => usage.as_str()).increment(1);

        for generation in [MetricGeneration::Current, MetricGeneration::Deprecated] {
            self.usage[generation.index()][usage.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn skip_decisions(&self, generation: MetricGeneration, usage: UsageType) -> u64 {
        self.usage[generation.index()][usage.index()].load(Ordering::Relaxed)
    }

    /// Count a TLS verification failure against an agent in both generations.
    pub fn record_tls_failure(&self) {
        counter!(BACKEND_TLS_FAILURE_TOTAL).increment(1);
        counter!(DEPRECATED_BACKEND_TLS_FAILURE_TOTAL).increment(1);

        for generation in [MetricGeneration::Current, MetricGeneration::Deprecated] {
            self.tls_failures[generation.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn tls_failures(&self, generation: MetricGeneration) -> u64 {
        self.tls_failures[generation.index()].load(Ordering::Relaxed)
    }

    /// Count a finished log request under its overridden verb.
    pub fn record_request(&self, verb: &str, code: u16) {
        let verb = override_metrics_verb(verb).to_string();
        counter!(REQUESTS_TOTAL, "verb" => verb.clone(), "code" => code.to_string()).increment(1);
        *self.requests.entry((verb, code)).or_insert(0) += 1;
    }

    pub fn requests(&self, verb: &str, code: u16) -> u64 {
        self.requests
            .get(&(verb.to_string(), code))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn set_active_streams(&self, active: u64) {
        gauge!(ACTIVE_STREAMS).set(active as f64);
    }
}
