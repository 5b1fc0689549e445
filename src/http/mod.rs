//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → handlers.rs (decode options, open stream, spawn copy loop)
//!     → response.rs (failures as JSON Status)
//!     → text/plain stream to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::Status;
pub use server::{HttpServer, LOG_ROUTE};
