//! Stream session tracking.
//!
//! Every forwarded stream holds a guard for its lifetime so shutdown can
//! wait for copies to drain and the active-streams gauge stays accurate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::UsageTelemetry;

/// Tracks in-flight stream sessions.
#[derive(Debug, Clone)]
pub struct StreamTracker {
    active_count: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    telemetry: Arc<UsageTelemetry>,
}

impl StreamTracker {
    pub fn new(telemetry: Arc<UsageTelemetry>) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            telemetry,
        }
    }

    /// Record a new active stream. Returns a guard that decrements on drop.
    pub fn track(&self) -> StreamGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.telemetry.set_active_streams(active);
        StreamGuard {
            active_count: Arc::clone(&self.active_count),
            telemetry: Arc::clone(&self.telemetry),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Get current active stream count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all streams have finished.
    pub async fn wait_for_drain(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a stream's lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    active_count: Arc<AtomicU64>,
    telemetry: Arc<UsageTelemetry>,
    id: u64,
}

impl StreamGuard {
    /// Sequence number of this stream, for log correlation.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.telemetry.set_active_streams(active);
        tracing::trace!(stream_id = self.id, "Stream session closed");
    }
}
