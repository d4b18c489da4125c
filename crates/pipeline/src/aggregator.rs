//! Static aggregator - global size-triggered grouping
//!
//! Commands arriving outside any delimiter scope, from every producer,
//! accumulate in one shared sequence. When the sequence reaches the
//! block size exactly, the whole sequence is swapped out and returned
//! for delivery. The length check and the swap share one critical
//! section, so two producers can never both observe the threshold for
//! the same block.

use std::num::NonZeroUsize;

use parking_lot::Mutex;

struct AggregatorState {
    /// Shared block size; set once by the first connect.
    block_size: NonZeroUsize,
    pending: Vec<String>,
}

/// Shared size-triggered aggregator.
pub struct StaticAggregator {
    state: Mutex<AggregatorState>,
}

impl StaticAggregator {
    /// Create an aggregator with the configured default block size.
    pub fn new(block_size: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                block_size,
                pending: Vec::new(),
            }),
        }
    }

    /// Adopt the block size of the first connection.
    ///
    /// Later calls are no-ops once any command has been accepted, so
    /// the threshold cannot move under an in-flight group.
    pub fn set_block_size_once(&self, block_size: NonZeroUsize) {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            state.block_size = block_size;
        }
    }

    /// Currently effective block size.
    pub fn block_size(&self) -> NonZeroUsize {
        self.state.lock().block_size
    }

    /// Append a command; returns the full group when the pending length
    /// reaches the block size exactly.
    pub fn submit(&self, command: String) -> Option<Vec<String>> {
        let mut state = self.state.lock();
        state.pending.push(command);
        if state.pending.len() == state.block_size.get() {
            Some(std::mem::take(&mut state.pending))
        } else {
            None
        }
    }

    /// Take whatever remains below the threshold (terminate path).
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Number of commands waiting below the threshold.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
