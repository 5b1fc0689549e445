//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     listener TLS (tls.rs, optional) → HTTP layer
//!
//! Outbound, per log request:
//!     Endpoint + skip-verify flag
//!     → transport.rs (trust material, client identity, redirects off)
//!     → Transport, owned by exactly one request
//! ```
//!
//! Transports are never pooled or shared: the TLS decision is made per
//! request, and an agent connection must close when its stream ends.

pub mod tls;
pub mod transport;

pub use transport::{Transport, TransportBuilder, TransportError};
