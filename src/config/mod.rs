//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! The registry snapshot is a separate file with its own reload path,
//! see `crate::registry`.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AgentConnectionConfig;
pub use schema::AgentScheme;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RegistryConfig;
pub use schema::RelayConfig;
pub use schema::TimeoutConfig;
