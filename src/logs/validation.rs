//! Option shape validation.
//!
//! Runs before anything touches the registry or the network. Every
//! violation is reported, not just the first.

use std::fmt;

use serde::Serialize;

use crate::logs::options::{LogOptions, STREAM_ALL, STREAM_STDERR, STREAM_STDOUT};

/// Category of a field violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldErrorKind {
    /// The value is out of range or malformed.
    Invalid,
    /// The field may not be combined with another one.
    Forbidden,
    /// The value is not one of the supported choices.
    NotSupported,
}

/// A single invalid field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub kind: FieldErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl FieldError {
    fn invalid(field: &'static str, value: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            field,
            kind: FieldErrorKind::Invalid,
            value: Some(value.to_string()),
            message: message.into(),
        }
    }

    fn forbidden(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            kind: FieldErrorKind::Forbidden,
            value: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: Invalid value: \"{}\": {}", self.field, value, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// Validate log options, returning every violation found.
pub fn validate_log_options(options: &LogOptions) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if let Some(tail) = options.tail_lines {
        if tail < 0 {
            errors.push(FieldError::invalid("tailLines", tail, "must be greater than or equal to 0"));
        }
    }

    if let Some(limit) = options.limit_bytes {
        if limit < 1 {
            errors.push(FieldError::invalid("limitBytes", limit, "must be greater than 0"));
        }
    }

    match (options.since_seconds, options.since_time) {
        (Some(_), Some(_)) => errors.push(FieldError::forbidden(
            "sinceSeconds",
            "at most one of `sinceTime` or `sinceSeconds` may be specified",
        )),
        (Some(seconds), None) if seconds < 1 => {
            errors.push(FieldError::invalid("sinceSeconds", seconds, "must be greater than 0"));
        }
        _ => {}
    }

    if let (Some(since), Some(until)) = (options.since_time, options.until_time) {
        if until < since {
            errors.push(FieldError::invalid(
                "untilTime",
                until.to_rfc3339(),
                "must not be before `sinceTime`",
            ));
        }
    }

    if options.previous && options.follow {
        errors.push(FieldError::forbidden(
            "follow",
            "may not be combined with `previous`: a terminated instance produces no new output",
        ));
    }

    if let Some(stream) = options.stream.as_deref() {
        if ![STREAM_ALL, STREAM_STDOUT, STREAM_STDERR].contains(&stream) {
            errors.push(FieldError {
                field: "stream",
                kind: FieldErrorKind::NotSupported,
                value: Some(stream.to_string()),
                message: format!(
                    "supported values: \"{}\", \"{}\", \"{}\"",
                    STREAM_ALL, STREAM_STDOUT, STREAM_STDERR
                ),
            });
        } else if options.tail_lines.is_some() && options.specific_stream().is_some() {
            errors.push(FieldError::forbidden(
                "tailLines",
                "`tailLines` and specific `stream` are mutually exclusive for now",
            ));
        }
    }

    errors
}
