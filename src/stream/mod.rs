//! Stream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint + Transport
//!     → forwarder.rs (single request, redirect/status/TLS policy)
//!     → checker.rs (status classes, TLS failure detection)
//!     → LogStream::copy_to (ordered copy, optional flush per write)
//!     → session.rs (active stream tracking for drain and metrics)
//! ```
//!
//! Nothing here retries: once bytes may have reached the client a stream
//! cannot be replayed, so every failure is terminal and the client issues
//! a fresh request.

pub mod checker;
pub mod forwarder;
pub mod session;

pub use forwarder::{Forwarder, LogStream, StreamError, StreamOutcome};
pub use session::{StreamGuard, StreamTracker};
