//! Per-request transport construction.

use std::path::Path;
use std::time::Duration;

use reqwest::redirect::Policy;

use crate::config::{AgentConnectionConfig, TimeoutConfig};
use crate::locator::Endpoint;
use crate::net::tls::{load_ca_bundle, load_identity};

/// Error type for transport construction.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Trust material or client identity could not be turned into a TLS config.
    #[error("unable to build TLS configuration for agent {agent}: {reason}")]
    TlsConfig { agent: String, reason: String },

    #[error("unable to build client for agent {agent}: {source}")]
    Client {
        agent: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A client built for one request to one agent.
#[derive(Debug)]
pub struct Transport {
    client: reqwest::Client,
    insecure_skip_verify: bool,
    bearer_token: Option<String>,
}

impl Transport {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

/// Builds transports from agent connection settings.
///
/// Trust material is read from disk on every build so a rotated CA bundle
/// takes effect without a restart.
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    agents: AgentConnectionConfig,
    connect_timeout: Duration,
}

impl TransportBuilder {
    pub fn new(agents: AgentConnectionConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            agents,
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
        }
    }

    /// Build a transport for `endpoint`.
    ///
    /// With `insecure_skip_verify` the agent's serving certificate is not
    /// checked and the CA bundle is not consulted. Without it, an https
    /// endpoint requires usable trust material.
    pub fn build(&self, endpoint: &Endpoint, insecure_skip_verify: bool) -> Result<Transport, TransportError> {
        let tls_config_error = |reason: String| TransportError::TlsConfig {
            agent: endpoint.agent.clone(),
            reason,
        };

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(Policy::none())
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(0)
            .no_proxy();

        if endpoint.is_tls() {
            if insecure_skip_verify {
                builder = builder
                    .danger_accept_invalid_certs(true)
                    .danger_accept_invalid_hostnames(true);
            } else if let Some(ca_file) = &self.agents.ca_file {
                let certs = load_ca_bundle(Path::new(ca_file))
                    .map_err(|e| tls_config_error(format!("CA bundle {}: {}", ca_file, e)))?;
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
            }

            if let (Some(cert), Some(key)) = (&self.agents.client_cert_file, &self.agents.client_key_file) {
                let identity = load_identity(Path::new(cert), Path::new(key))
                    .map_err(|e| tls_config_error(format!("client identity {}: {}", cert, e)))?;
                builder = builder.identity(identity);
            }
        }

        let client = builder.build().map_err(|source| TransportError::Client {
            agent: endpoint.agent.clone(),
            source,
        })?;

        tracing::debug!(
            agent = %endpoint.agent,
            tls = endpoint.is_tls(),
            insecure_skip_verify,
            "Transport built"
        );

        Ok(Transport {
            client,
            insecure_skip_verify,
            // Never leak the token over plaintext.
            bearer_token: self.agents.bearer_token.clone().filter(|_| endpoint.is_tls()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentScheme;

    fn endpoint(scheme: AgentScheme) -> Endpoint {
        Endpoint {
            agent: "agent-a".into(),
            scheme,
            host: "127.0.0.1".into(),
            port: 10250,
            path: "/containerLogs/default/web-1/nginx".into(),
            query: Vec::new(),
        }
    }

    fn builder_with_ca(ca_file: Option<&str>) -> TransportBuilder {
        let agents = AgentConnectionConfig {
            ca_file: ca_file.map(str::to_string),
            bearer_token: Some("token".into()),
            ..Default::default()
        };
        TransportBuilder::new(agents, &TimeoutConfig::default())
    }

    #[test]
    fn missing_ca_fails_when_verifying() {
        let builder = builder_with_ca(Some("/nonexistent/ca.pem"));
        let err = builder.build(&endpoint(AgentScheme::Https), false).unwrap_err();
        assert!(matches!(err, TransportError::TlsConfig { ref agent, .. } if agent == "agent-a"));
    }

    #[test]
    fn missing_ca_ignored_when_skipping_verification() {
        let builder = builder_with_ca(Some("/nonexistent/ca.pem"));
        let transport = builder.build(&endpoint(AgentScheme::Https), true).unwrap();
        assert!(transport.insecure_skip_verify());
        assert_eq!(transport.bearer_token(), Some("token"));
    }

    #[test]
    fn plaintext_endpoint_needs_no_trust_material() {
        let builder = builder_with_ca(Some("/nonexistent/ca.pem"));
        let transport = builder.build(&endpoint(AgentScheme::Http), false).unwrap();
        assert!(!transport.insecure_skip_verify());
        assert_eq!(transport.bearer_token(), None);
    }

    #[test]
    fn system_roots_used_without_ca_file() {
        let builder = builder_with_ca(None);
        assert!(builder.build(&endpoint(AgentScheme::Https), false).is_ok());
    }
}
