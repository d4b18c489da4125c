//! Worker pool - one drainer task per sink kind
//!
//! Exactly one long-lived task serves each sink kind, so no two workers
//! of one kind can ever process overlapping blocks; the no-duplicate,
//! no-interleave property holds by construction instead of through a
//! drain lock.
//!
//! Each worker loop: fetch the blocks still pending for its kind; if
//! none, await the queue's wake signal or cancellation; otherwise emit
//! in queue order, mark delivered on success only, and reclaim. A
//! failed emit leaves the block unmarked and is retried after a short
//! delay. On cancellation a worker makes one final best-effort drain
//! pass so `terminate`'s forced flushes still reach the sinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulk_protocol::{Block, SinkKind};
use bulk_sinks::BlockSink;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue::DeliveryQueue;

/// Delay before retrying blocks whose emit failed.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Fixed roster of sink workers.
pub struct WorkerPool {
    started: AtomicBool,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool with no workers running.
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// True once `start` has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Spawn one worker task per sink.
    ///
    /// Idempotent: only the first call spawns; later calls return
    /// false and drop the offered sinks.
    pub fn start(&self, queue: Arc<DeliveryQueue>, sinks: Vec<Box<dyn BlockSink>>) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut handles = self.handles.lock();
        for sink in sinks {
            let queue = Arc::clone(&queue);
            let cancel = self.cancel.clone();
            let wake = queue.subscribe();
            handles.push(tokio::spawn(run_worker(queue, sink, cancel, wake)));
        }

        tracing::info!(workers = handles.len(), "worker pool started");
        true
    }

    /// Signal every worker to stop after its final drain pass.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Await worker exit (test and shutdown tooling; `terminate` itself
    /// never joins - shutdown is best-effort by design).
    pub async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(
    queue: Arc<DeliveryQueue>,
    mut sink: Box<dyn BlockSink>,
    cancel: CancellationToken,
    mut wake: watch::Receiver<u64>,
) {
    let kind = sink.kind();
    tracing::debug!(sink = %kind, "sink worker starting");

    loop {
        let pending = queue.fetch_pending(kind);

        if pending.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = wake.changed() => {
                    if changed.is_err() {
                        // Queue dropped; nothing more will arrive
                        break;
                    }
                }
            }
            continue;
        }

        let had_failure = drain(&queue, sink.as_mut(), kind, &pending).await;
        if had_failure {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }
    }

    // Final pass for blocks flushed during shutdown
    let pending = queue.fetch_pending(kind);
    if !pending.is_empty() {
        drain(&queue, sink.as_mut(), kind, &pending).await;
    }

    tracing::debug!(sink = %kind, "sink worker stopped");
}

/// Emit a fetched batch in queue order, marking only successes.
///
/// Returns true when any emit failed.
async fn drain(
    queue: &DeliveryQueue,
    sink: &mut dyn BlockSink,
    kind: SinkKind,
    pending: &[Arc<Block>],
) -> bool {
    let mut had_failure = false;

    for block in pending {
        match sink.emit(block).await {
            Ok(()) => {
                queue.mark_delivered(block.id(), kind);
            }
            Err(e) => {
                had_failure = true;
                tracing::warn!(
                    sink = %kind,
                    block_id = %block.id(),
                    error = %e,
                    "emit failed, block kept for retry"
                );
            }
        }
    }

    queue.reclaim();
    had_failure
}

#[cfg(test)]
#[path = "workers_test.rs"]
mod workers_test;
