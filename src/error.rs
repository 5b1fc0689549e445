//! Top-level error taxonomy for log requests.

use crate::locator::LocateError;
use crate::logs::FieldError;
use crate::net::TransportError;
use crate::stream::StreamError;

/// Why a log request could not be served.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The query string could not be decoded into options.
    #[error("invalid query: {0}")]
    BadQuery(String),

    /// The options decoded but failed validation.
    #[error("invalid log options for workload \"{name}\": {}", join(.errors))]
    InvalidOptions { name: String, errors: Vec<FieldError> },

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

fn join(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}
