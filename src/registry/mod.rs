//! Workload registry subsystem.
//!
//! # Data Flow
//! ```text
//! snapshot file (TOML: agents + workloads)
//!     → snapshot.rs (parse, index, reject duplicates)
//!     → SnapshotRegistry (ArcSwap, read per request)
//!
//! On file change:
//!     watcher.rs → load → validate → atomic swap
//! ```
//!
//! The registry is read-only from the relay's point of view; whatever
//! schedules workloads rewrites the snapshot file.

pub mod snapshot;
pub mod watcher;

pub use snapshot::{
    load_snapshot, Agent, ConnectionInfo, ConnectionInfoGetter, RegistrySnapshot, SnapshotError,
    SnapshotFile, SnapshotRegistry, Workload, WorkloadRegistry,
};
pub use watcher::RegistryWatcher;
