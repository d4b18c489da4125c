//! Delivery queue - blocks awaiting consumption
//!
//! Ordered collection of blocks, oldest first, each paired with a
//! grow-only delivery mask. `append` and reclamation take the exclusive
//! lock; `fetch_pending` takes the shared lock, so workers for
//! different sink kinds scan concurrently. Marking goes through the
//! atomic mask and needs no exclusive access at all.
//!
//! Reclamation removes *any* fully-delivered entry, not just a prefix:
//! sinks drain at independent speeds, so completion is not FIFO. It
//! runs after every append and after every worker drain pass, so a
//! fully-delivered block never lingers.
//!
//! Workers learn about new blocks through a `tokio::sync::watch`
//! counter; the versioned channel means a wakeup between fetch and
//! await is never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulk_protocol::{Block, BlockId, DeliveryMask, SinkKind};
use parking_lot::RwLock;
use tokio::sync::watch;

struct QueueEntry {
    block: Arc<Block>,
    delivered: DeliveryMask,
}

/// Point-in-time snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub blocks_appended: u64,
    pub commands_appended: u64,
    pub blocks_reclaimed: u64,
}

/// Shared queue of blocks with per-sink completion tracking.
pub struct DeliveryQueue {
    entries: RwLock<Vec<QueueEntry>>,
    next_id: AtomicU64,

    /// Appended-block counter published to workers as a wake signal.
    appended_tx: watch::Sender<u64>,

    blocks_appended: AtomicU64,
    commands_appended: AtomicU64,
    blocks_reclaimed: AtomicU64,
}

impl DeliveryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (appended_tx, _) = watch::channel(0);
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            appended_tx,
            blocks_appended: AtomicU64::new(0),
            commands_appended: AtomicU64::new(0),
            blocks_reclaimed: AtomicU64::new(0),
        }
    }

    /// Wrap `commands` into a fresh block, enqueue it, and wake workers.
    ///
    /// Runs a reclamation pass inside the same exclusive section.
    pub fn append(&self, commands: Vec<String>) -> Arc<Block> {
        let id = BlockId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let block = Arc::new(Block::new(id, commands));

        let queue_len = {
            let mut entries = self.entries.write();
            entries.push(QueueEntry {
                block: Arc::clone(&block),
                delivered: DeliveryMask::new(),
            });
            self.reclaim_locked(&mut entries);
            entries.len()
        };

        self.blocks_appended.fetch_add(1, Ordering::Relaxed);
        self.commands_appended
            .fetch_add(block.len() as u64, Ordering::Relaxed);

        tracing::debug!(
            block_id = %block.id(),
            commands = block.len(),
            queue_len,
            "block appended"
        );

        // send_modify publishes even with no live receivers yet
        self.appended_tx.send_modify(|n| *n += 1);

        block
    }

    /// Every block not yet delivered to `sink`, in queue order.
    ///
    /// Never mutates masks - marking is a separate step performed by
    /// the worker after emitting, so a render failure cannot silently
    /// mark a block delivered.
    pub fn fetch_pending(&self, sink: SinkKind) -> Vec<Arc<Block>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| !entry.delivered.load().contains(sink))
            .map(|entry| Arc::clone(&entry.block))
            .collect()
    }

    /// Mark `sink` delivered for the given block.
    ///
    /// Returns true when the mask is now full and the entry is eligible
    /// for reclamation.
    pub fn mark_delivered(&self, id: BlockId, sink: SinkKind) -> bool {
        let entries = self.entries.read();
        match entries.iter().find(|entry| entry.block.id() == id) {
            Some(entry) => entry.delivered.mark(sink).is_full(),
            None => {
                // Only fully-delivered entries are reclaimed, so this
                // means a worker marked a block twice.
                tracing::warn!(block_id = %id, sink = %sink, "mark on reclaimed block");
                false
            }
        }
    }

    /// Remove every fully-delivered entry; returns how many.
    pub fn reclaim(&self) -> usize {
        let mut entries = self.entries.write();
        self.reclaim_locked(&mut entries)
    }

    fn reclaim_locked(&self, entries: &mut Vec<QueueEntry>) -> usize {
        let before = entries.len();
        entries.retain(|entry| !entry.delivered.load().is_full());
        let removed = before - entries.len();
        if removed > 0 {
            self.blocks_reclaimed
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::trace!(removed, remaining = entries.len(), "blocks reclaimed");
        }
        removed
    }

    /// Subscribe to the appended-block wake signal.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.appended_tx.subscribe()
    }

    /// Number of blocks currently queued.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no block awaits delivery.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current counter snapshot.
    pub fn metrics_snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            blocks_appended: self.blocks_appended.load(Ordering::Relaxed),
            commands_appended: self.commands_appended.load(Ordering::Relaxed),
            blocks_reclaimed: self.blocks_reclaimed.load(Ordering::Relaxed),
        }
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
