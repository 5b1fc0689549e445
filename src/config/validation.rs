//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All errors are collected
//! so an operator sees every problem in one pass.

use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.registry.snapshot_path.trim().is_empty() {
        errors.push(ValidationError::new("registry.snapshot_path", "must not be empty"));
    }

    if config.agents.port == 0 {
        errors.push(ValidationError::new("agents.port", "must be greater than 0"));
    }

    match (&config.agents.client_cert_file, &config.agents.client_key_file) {
        (Some(_), None) => errors.push(ValidationError::new(
            "agents.client_key_file",
            "required when client_cert_file is set",
        )),
        (None, Some(_)) => errors.push(ValidationError::new(
            "agents.client_cert_file",
            "required when client_key_file is set",
        )),
        _ => {}
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }

    if config.timeouts.response_header_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.response_header_secs",
            "must be greater than 0",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.agents.port = 0;
        config.agents.client_cert_file = Some("cert.pem".into());
        config.timeouts.connect_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "agents.port",
                "agents.client_key_file",
                "timeouts.connect_secs",
            ]
        );
    }

    #[test]
    fn bearer_token_allowed_with_http_default() {
        // Agents may override the scheme to https; plaintext agents never get the token.
        let mut config = RelayConfig::default();
        config.agents.scheme = crate::config::schema::AgentScheme::Http;
        config.agents.bearer_token = Some("secret".into());

        assert!(validate_config(&config).is_ok());
    }
}
