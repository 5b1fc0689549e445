//! Registry snapshot: the point-in-time view of agents and workloads.
//!
//! A snapshot is immutable once built. `SnapshotRegistry` holds the current
//! one behind an `ArcSwap` so readers never block a reload and a reload
//! never observes a half-updated view.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::{AgentConnectionConfig, AgentScheme};

/// A unit of work whose containers produce logs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Workload {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub containers: Vec<String>,
    /// Agent currently hosting the workload. `None` while unscheduled.
    #[serde(default)]
    pub agent: Option<String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// A node agent serving container logs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Agent {
    pub name: String,
    /// Hostname or IP address.
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub scheme: Option<AgentScheme>,
}

/// Where to reach an agent, after applying connection defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub scheme: AgentScheme,
    pub host: String,
    pub port: u16,
}

/// Read access to workloads.
pub trait WorkloadRegistry: Send + Sync {
    fn workload(&self, namespace: &str, name: &str) -> Option<&Workload>;
}

/// Resolves an agent name to connection details.
pub trait ConnectionInfoGetter: Send + Sync {
    fn connection_info(&self, agent: &str) -> Option<ConnectionInfo>;
}

/// On-disk layout of a snapshot file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotFile {
    pub agents: Vec<Agent>,
    pub workloads: Vec<Workload>,
}

/// Error type for snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate agent '{0}'")]
    DuplicateAgent(String),
    #[error("duplicate workload '{0}/{1}'")]
    DuplicateWorkload(String, String),
}

/// Indexed, immutable view of the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    agents: HashMap<String, Agent>,
    workloads: HashMap<(String, String), Workload>,
    default_port: u16,
    default_scheme: AgentScheme,
}

impl RegistrySnapshot {
    /// Build a snapshot, rejecting duplicate names.
    pub fn build(file: SnapshotFile, defaults: &AgentConnectionConfig) -> Result<Self, SnapshotError> {
        let mut agents = HashMap::with_capacity(file.agents.len());
        for agent in file.agents {
            if agents.contains_key(&agent.name) {
                return Err(SnapshotError::DuplicateAgent(agent.name));
            }
            agents.insert(agent.name.clone(), agent);
        }

        let mut workloads = HashMap::with_capacity(file.workloads.len());
        for workload in file.workloads {
            let key = (workload.namespace.clone(), workload.name.clone());
            if workloads.contains_key(&key) {
                return Err(SnapshotError::DuplicateWorkload(key.0, key.1));
            }
            workloads.insert(key, workload);
        }

        Ok(Self {
            agents,
            workloads,
            default_port: defaults.port,
            default_scheme: defaults.scheme,
        })
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn workload_count(&self) -> usize {
        self.workloads.len()
    }
}

impl WorkloadRegistry for RegistrySnapshot {
    fn workload(&self, namespace: &str, name: &str) -> Option<&Workload> {
        self.workloads.get(&(namespace.to_string(), name.to_string()))
    }
}

impl ConnectionInfoGetter for RegistrySnapshot {
    fn connection_info(&self, agent: &str) -> Option<ConnectionInfo> {
        self.agents.get(agent).map(|a| ConnectionInfo {
            scheme: a.scheme.unwrap_or(self.default_scheme),
            host: a.address.clone(),
            port: a.port.unwrap_or(self.default_port),
        })
    }
}

/// Read and index a snapshot file.
pub fn load_snapshot(path: &Path, defaults: &AgentConnectionConfig) -> Result<RegistrySnapshot, SnapshotError> {
    let content = fs::read_to_string(path)?;
    let file: SnapshotFile = toml::from_str(&content)?;
    RegistrySnapshot::build(file, defaults)
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotRegistry {
    current: ArcSwap<RegistrySnapshot>,
    generation: AtomicU64,
}

impl SnapshotRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            generation: AtomicU64::new(1),
        }
    }

    /// The snapshot as of now. Callers must not hold it across requests.
    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the snapshot.
    pub fn replace(&self, snapshot: RegistrySnapshot) {
        self.current.store(Arc::new(snapshot));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(generation, "Registry snapshot replaced");
    }

    /// Number of snapshots installed so far, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
