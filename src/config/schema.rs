//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the log relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Where the workload registry snapshot lives.
    pub registry: RegistryConfig,

    /// How agents are reached.
    pub agents: AgentConnectionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Registry snapshot source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the TOML snapshot describing agents and workloads.
    pub snapshot_path: String,

    /// Reload the snapshot when the file changes.
    pub watch: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "registry.toml".to_string(),
            watch: true,
        }
    }
}

/// Scheme used to reach an agent.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentScheme {
    Http,
    #[default]
    Https,
}

impl AgentScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentScheme::Http => "http",
            AgentScheme::Https => "https",
        }
    }
}

/// Defaults for agent connections. Individual agents may override
/// port and scheme in the registry snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConnectionConfig {
    /// Port the agent's log endpoint listens on.
    pub port: u16,

    pub scheme: AgentScheme,

    /// CA bundle (PEM) trusted for agent serving certificates.
    pub ca_file: Option<String>,

    /// Client certificate (PEM) presented to agents.
    pub client_cert_file: Option<String>,

    /// Client private key (PEM) presented to agents.
    pub client_key_file: Option<String>,

    /// Bearer token sent to agents.
    pub bearer_token: Option<String>,
}

impl Default for AgentConnectionConfig {
    fn default() -> Self {
        Self {
            port: 10250,
            scheme: AgentScheme::Https,
            ca_file: None,
            client_cert_file: None,
            client_key_file: None,
            bearer_token: None,
        }
    }
}

/// Timeout configuration for agent connections.
///
/// There is deliberately no total request timeout: follow streams are
/// unbounded in duration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the agent to send response headers, in seconds.
    pub response_header_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            response_header_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
