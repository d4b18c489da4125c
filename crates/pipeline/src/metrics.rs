//! Pipeline counters
//!
//! Lock-free counters bumped on the hot ingest path and read via
//! `snapshot` for logging and shutdown summaries.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the ingest side of the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub commands_received: AtomicU64,
    pub static_blocks: AtomicU64,
    pub scope_blocks: AtomicU64,
    pub forced_blocks: AtomicU64,
    pub protocol_violations: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            static_blocks: self.static_blocks.load(Ordering::Relaxed),
            scope_blocks: self.scope_blocks.load(Ordering::Relaxed),
            forced_blocks: self.forced_blocks.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub commands_received: u64,
    pub static_blocks: u64,
    pub scope_blocks: u64,
    pub forced_blocks: u64,
    pub protocol_violations: u64,
}

impl PipelineMetricsSnapshot {
    /// Total blocks flushed to the delivery queue.
    pub fn total_blocks(&self) -> u64 {
        self.static_blocks + self.scope_blocks + self.forced_blocks
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::PipelineMetrics;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = PipelineMetrics::new();
        metrics.commands_received.fetch_add(7, Ordering::Relaxed);
        metrics.static_blocks.fetch_add(2, Ordering::Relaxed);
        metrics.scope_blocks.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.commands_received, 7);
        assert_eq!(snap.total_blocks(), 3);
    }
}
