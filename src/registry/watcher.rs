//! Snapshot file watcher for hot reload.
//!
//! Workloads get rescheduled between agents; the snapshot file is rewritten
//! when that happens and the registry picks the new view up here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::AgentConnectionConfig;
use crate::registry::snapshot::{load_snapshot, SnapshotRegistry};

/// A watcher that monitors the snapshot file for changes.
pub struct RegistryWatcher {
    path: PathBuf,
    registry: Arc<SnapshotRegistry>,
    defaults: AgentConnectionConfig,
}

impl RegistryWatcher {
    pub fn new(path: &Path, registry: Arc<SnapshotRegistry>, defaults: AgentConnectionConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            registry,
            defaults,
        }
    }

    /// Reload once. A broken file keeps the current snapshot.
    pub fn reload(&self) -> bool {
        reload_into(&self.path, &self.registry, &self.defaults)
    }

    /// Start watching the file in a background thread.
    ///
    /// The parent directory is watched rather than the file itself, so a
    /// snapshot replaced by renaming a new file over it keeps being seen.
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let registry = self.registry.clone();
        let defaults = self.defaults.clone();
        let file_name = self.path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    // A remove is followed by the create or rename that replaces it.
                    if relevant && ours && path.exists() {
                        tracing::info!("Registry snapshot change detected, reloading...");
                        reload_into(&path, &registry, &defaults);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Registry watcher started");
        Ok(watcher)
    }
}

fn reload_into(path: &Path, registry: &SnapshotRegistry, defaults: &AgentConnectionConfig) -> bool {
    match load_snapshot(path, defaults) {
        Ok(snapshot) => {
            tracing::info!(
                agents = snapshot.agent_count(),
                workloads = snapshot.workload_count(),
                "Registry snapshot loaded"
            );
            registry.replace(snapshot);
            true
        }
        Err(e) => {
            tracing::error!("Failed to reload registry snapshot: {}. Keeping current snapshot.", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::snapshot::{RegistrySnapshot, WorkloadRegistry};

    #[test]
    fn broken_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "[[workloads]]\nname = \"web-1\"\n").unwrap();

        let registry = Arc::new(SnapshotRegistry::new(RegistrySnapshot::default()));
        let watcher = RegistryWatcher::new(&path, registry.clone(), AgentConnectionConfig::default());

        assert!(watcher.reload());
        assert!(registry.current().workload("default", "web-1").is_some());

        std::fs::write(&path, "[[workloads]\nname = ").unwrap();
        assert!(!watcher.reload());
        assert!(registry.current().workload("default", "web-1").is_some());
        assert_eq!(registry.generation(), 2);
    }

    fn hosted_by(agent: &str) -> String {
        format!("[[workloads]]\nname = \"web-1\"\ncontainers = [\"app\"]\nagent = \"{}\"\n", agent)
    }

    fn wait_for_agent(registry: &SnapshotRegistry, agent: &str) -> bool {
        for _ in 0..100 {
            let current = registry.current();
            if current.workload("default", "web-1").and_then(|w| w.agent.as_deref()) == Some(agent) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn follows_repeated_atomic_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, hosted_by("agent-a")).unwrap();

        let defaults = AgentConnectionConfig::default();
        let registry = Arc::new(SnapshotRegistry::new(load_snapshot(&path, &defaults).unwrap()));
        let _watcher = RegistryWatcher::new(&path, registry.clone(), defaults).run().unwrap();

        for agent in ["agent-b", "agent-c"] {
            let staged = dir.path().join("registry.toml.tmp");
            std::fs::write(&staged, hosted_by(agent)).unwrap();
            std::fs::rename(&staged, &path).unwrap();
            assert!(wait_for_agent(&registry, agent), "snapshot never moved to {agent}");
        }
    }
}
