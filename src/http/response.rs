//! Error responses.
//!
//! Failures are returned as a JSON `Status` object; only successful
//! requests produce the plain-text log stream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::LogError;
use crate::locator::LocateError;
use crate::logs::{FieldError, FieldErrorKind};
use crate::net::TransportError;
use crate::stream::StreamError;

/// Non-standard code used when the client went away before a response.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Wire form of a failed request.
#[derive(Debug, Serialize)]
pub struct Status {
    pub kind: &'static str,
    pub status: &'static str,
    pub message: String,
    pub reason: &'static str,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

#[derive(Debug, Serialize)]
pub struct StatusDetails {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<StatusCause>,
}

#[derive(Debug, Serialize)]
pub struct StatusCause {
    pub reason: &'static str,
    pub message: String,
    pub field: &'static str,
}

impl From<&FieldError> for StatusCause {
    fn from(error: &FieldError) -> Self {
        let reason = match error.kind {
            FieldErrorKind::Invalid => "FieldValueInvalid",
            FieldErrorKind::Forbidden => "FieldValueForbidden",
            FieldErrorKind::NotSupported => "FieldValueNotSupported",
        };
        Self {
            reason,
            message: error.to_string(),
            field: error.field,
        }
    }
}

impl LogError {
    /// HTTP status and machine-readable reason for this failure.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            LogError::BadQuery(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            LogError::InvalidOptions { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid"),
            LogError::Locate(e) => match e {
                LocateError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
                LocateError::Unscheduled { .. } | LocateError::AgentUnavailable { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable")
                }
                LocateError::ContainerRequired { .. } | LocateError::InvalidContainer { .. } => {
                    (StatusCode::BAD_REQUEST, "BadRequest")
                }
            },
            LogError::Transport(e) => match e {
                TransportError::TlsConfig { .. } | TransportError::Client { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
                }
            },
            LogError::Stream(e) => match e {
                StreamError::InvalidLocation { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
                StreamError::RedirectNotAllowed { .. }
                | StreamError::TlsVerification { .. }
                | StreamError::Connect { .. }
                | StreamError::Body { .. } => (StatusCode::BAD_GATEWAY, "BadGateway"),
                StreamError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
                StreamError::BackendStatus { status, .. } => match StatusCode::from_u16(*status) {
                    Ok(code) if code.is_client_error() || code.is_server_error() => (code, "BackendError"),
                    _ => (StatusCode::BAD_GATEWAY, "BackendError"),
                },
                StreamError::Cancelled => (
                    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
                    "Cancelled",
                ),
            },
        }
    }

    fn details(&self) -> Option<StatusDetails> {
        match self {
            LogError::InvalidOptions { name, errors } => Some(StatusDetails {
                name: name.clone(),
                kind: "LogOptions",
                causes: errors.iter().map(StatusCause::from).collect(),
            }),
            _ => None,
        }
    }

    pub fn to_status(&self) -> Status {
        let (code, reason) = self.status();
        Status {
            kind: "Status",
            status: "Failure",
            message: self.to_string(),
            reason,
            code: code.as_u16(),
            details: self.details(),
        }
    }
}

impl IntoResponse for LogError {
    fn into_response(self) -> Response {
        let (code, _) = self.status();
        (code, Json(self.to_status())).into_response()
    }
}
