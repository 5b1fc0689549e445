//! The log request pipeline: validate, locate, build transport, open.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::LogError;
use crate::locator::Locate;
use crate::logs::options::LogOptions;
use crate::logs::validation::validate_log_options;
use crate::net::TransportBuilder;
use crate::observability::UsageTelemetry;
use crate::stream::{Forwarder, LogStream};

/// Serves log requests for workloads.
pub struct LogService {
    locator: Arc<dyn Locate>,
    transports: TransportBuilder,
    forwarder: Forwarder,
    telemetry: Arc<UsageTelemetry>,
}

impl LogService {
    pub fn new(
        locator: Arc<dyn Locate>,
        transports: TransportBuilder,
        forwarder: Forwarder,
        telemetry: Arc<UsageTelemetry>,
    ) -> Self {
        Self {
            locator,
            transports,
            forwarder,
            telemetry,
        }
    }

    pub fn telemetry(&self) -> &Arc<UsageTelemetry> {
        &self.telemetry
    }

    /// Open the log stream of `namespace/name`.
    ///
    /// The TLS decision is counted before validation so every request is
    /// counted exactly once, rejected ones included.
    pub async fn open(
        &self,
        namespace: &str,
        name: &str,
        options: &LogOptions,
        request_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LogStream, LogError> {
        let skip_verify = options.insecure_skip_tls_verify_backend;
        self.telemetry.record_skip_decision(skip_verify);

        let errors = validate_log_options(options);
        if !errors.is_empty() {
            return Err(LogError::InvalidOptions {
                name: name.to_string(),
                errors,
            });
        }

        let endpoint = self.locator.locate(namespace, name, options)?;
        tracing::debug!(
            namespace,
            name,
            agent = %endpoint.agent,
            endpoint = %endpoint,
            "Workload located"
        );

        let transport = self.transports.build(&endpoint, skip_verify)?;
        let stream = self.forwarder.open(&endpoint, transport, request_id, cancel).await?;
        Ok(stream)
    }
}
