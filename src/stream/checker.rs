//! Classification of agent responses and connection failures.

use std::error::Error as StdError;

use reqwest::StatusCode;

/// Upper bound on how much of an error body is kept for diagnostics.
pub const MAX_ERROR_BODY_BYTES: usize = 50_000;

/// What to do with an agent response, decided from its status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx: start streaming.
    Stream,
    /// 3xx: refuse, never follow.
    Redirect,
    /// Anything else: read the body and report it.
    Error,
}

pub fn classify_status(status: StatusCode) -> ResponseClass {
    if status.is_success() {
        ResponseClass::Stream
    } else if status.is_redirection() {
        ResponseClass::Redirect
    } else {
        ResponseClass::Error
    }
}

/// Whether a connection failure was the peer's certificate failing
/// verification, as opposed to any other transport problem.
///
/// The TLS stack reports through nested `io::Error`s whose `source()`
/// skips the custom payload, so payloads are entered explicitly.
pub fn is_tls_verification_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if is_certificate_error(e) {
            return true;
        }
        current = match e.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
            Some(payload) => Some(payload as &(dyn StdError + 'static)),
            None => e.source(),
        };
    }
    false
}

fn is_certificate_error(e: &(dyn StdError + 'static)) -> bool {
    matches!(
        e.downcast_ref::<rustls::Error>(),
        Some(rustls::Error::InvalidCertificate(_))
            | Some(rustls::Error::NoCertificatesPresented)
            | Some(rustls::Error::UnsupportedNameType)
    )
}

/// Truncate an error body to the diagnostic limit and decode it lossily.
pub fn error_body_text(body: &[u8]) -> String {
    let end = body.len().min(MAX_ERROR_BODY_BYTES);
    String::from_utf8_lossy(&body[..end]).trim_end().to_string()
}
