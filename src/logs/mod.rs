//! Workload log requests.
//!
//! # Data Flow
//! ```text
//! query string
//!     → options.rs (LogOptions)
//!     → service.rs
//!         → record TLS skip decision (once per request)
//!         → validation.rs (all field errors; stop here on failure)
//!         → locator (registry → Endpoint)
//!         → net::transport (per-request client)
//!         → stream::forwarder (open agent stream)
//! ```

pub mod options;
pub mod service;
pub mod validation;

pub use options::LogOptions;
pub use service::LogService;
pub use validation::{validate_log_options, FieldError, FieldErrorKind};
