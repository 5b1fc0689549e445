//! Resource location subsystem.
//!
//! # Data Flow
//! ```text
//! (namespace, name, LogOptions)
//!     → current registry snapshot (re-read on every call)
//!     → workload exists?            no → NotFound
//!     → workload scheduled?         no → Unscheduled
//!     → container resolvable?       no → ContainerRequired / InvalidContainer
//!     → agent connection info?      no → AgentUnavailable
//!     → Endpoint (scheme, host, port, path, query)
//! ```

pub mod endpoint;

use std::sync::Arc;

use chrono::SecondsFormat;

use crate::logs::LogOptions;
use crate::registry::{ConnectionInfoGetter, SnapshotRegistry, WorkloadRegistry};

pub use endpoint::Endpoint;

/// Error type for location failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("workload \"{namespace}/{name}\" not found")]
    NotFound { namespace: String, name: String },

    #[error("workload \"{namespace}/{name}\" is not scheduled to any agent")]
    Unscheduled { namespace: String, name: String },

    #[error("agent \"{agent}\" hosting workload \"{name}\" is not available")]
    AgentUnavailable { agent: String, name: String },

    #[error("a container name must be specified for workload {name}, choose one of: {choices:?}")]
    ContainerRequired { name: String, choices: Vec<String> },

    #[error("container {container} is not valid for workload {name}")]
    InvalidContainer { container: String, name: String },
}

/// Resolves a workload to the endpoint streaming its logs.
pub trait Locate: Send + Sync {
    fn locate(&self, namespace: &str, name: &str, options: &LogOptions) -> Result<Endpoint, LocateError>;
}

/// Locator reading from the live registry.
#[derive(Debug, Clone)]
pub struct RegistryLocator {
    registry: Arc<SnapshotRegistry>,
}

impl RegistryLocator {
    pub fn new(registry: Arc<SnapshotRegistry>) -> Self {
        Self { registry }
    }
}

impl Locate for RegistryLocator {
    fn locate(&self, namespace: &str, name: &str, options: &LogOptions) -> Result<Endpoint, LocateError> {
        let snapshot = self.registry.current();
        locate(snapshot.as_ref(), namespace, name, options)
    }
}

/// Resolve against a single snapshot. Pure: the result depends only on
/// the arguments.
pub fn locate<R>(registry: &R, namespace: &str, name: &str, options: &LogOptions) -> Result<Endpoint, LocateError>
where
    R: WorkloadRegistry + ConnectionInfoGetter + ?Sized,
{
    let workload = registry
        .workload(namespace, name)
        .ok_or_else(|| LocateError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    let container = match options.container.as_deref().filter(|c| !c.is_empty()) {
        Some(container) => {
            if !workload.containers.iter().any(|c| c == container) {
                return Err(LocateError::InvalidContainer {
                    container: container.to_string(),
                    name: name.to_string(),
                });
            }
            container.to_string()
        }
        None => match workload.containers.as_slice() {
            [only] => only.clone(),
            choices => {
                return Err(LocateError::ContainerRequired {
                    name: name.to_string(),
                    choices: choices.to_vec(),
                })
            }
        },
    };

    let agent = workload.agent.as_deref().ok_or_else(|| LocateError::Unscheduled {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })?;

    let info = registry
        .connection_info(agent)
        .ok_or_else(|| LocateError::AgentUnavailable {
            agent: agent.to_string(),
            name: name.to_string(),
        })?;

    Ok(Endpoint {
        agent: agent.to_string(),
        scheme: info.scheme,
        host: info.host,
        port: info.port,
        path: format!("/containerLogs/{}/{}/{}", namespace, name, container),
        query: backend_query(options),
    })
}

fn backend_query(options: &LogOptions) -> Vec<(String, String)> {
    let mut query = Vec::new();
    let mut push = |key: &str, value: String| query.push((key.to_string(), value));

    if options.follow {
        push("follow", "true".into());
    }
    if options.previous {
        push("previous", "true".into());
    }
    if options.timestamps {
        push("timestamps", "true".into());
    }
    if let Some(seconds) = options.since_seconds {
        push("sinceSeconds", seconds.to_string());
    }
    if let Some(since) = options.since_time {
        push("sinceTime", since.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Some(until) = options.until_time {
        push("untilTime", until.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Some(tail) = options.tail_lines {
        push("tailLines", tail.to_string());
    }
    if let Some(limit) = options.limit_bytes {
        push("limitBytes", limit.to_string());
    }
    if let Some(stream) = options.specific_stream() {
        push("stream", stream.to_string());
    }
    query
}
