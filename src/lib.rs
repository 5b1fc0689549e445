//! Log relay library.
//!
//! Streams the logs of a workload from the agent hosting it to the client.
//!
//! ```text
//!   client ──GET …/workloads/{name}/log──▶ http ──▶ logs::LogService
//!                                                    │ count TLS decision (observability)
//!                                                    │ validate options   (logs)
//!                                                    │ locate workload    (locator ← registry)
//!                                                    │ build transport    (net)
//!                                                    ▼ open + copy        (stream)
//!   client ◀──────────── text/plain ─────────────── agent
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod locator;
pub mod logs;
pub mod net;
pub mod observability;
pub mod registry;
pub mod stream;

pub use config::schema::RelayConfig;
pub use error::LogError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
