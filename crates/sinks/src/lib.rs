//! Bulk Sinks - Block consumers
//!
//! Each sink renders an already-assembled `Block` to its destination:
//! `ConsoleSink` to stdout, `FileSink` to one file per block. Sinks do
//! not talk to the delivery queue themselves - a pipeline worker fetches
//! pending blocks, calls `emit`, and marks delivery only on success, so
//! a render failure is retried rather than silently dropped.

mod console;
mod file;

pub use console::{ConsoleConfig, ConsoleMetricsSnapshot, ConsoleSink};
pub use file::{FileMetricsSnapshot, FileSink, FileSinkConfig};

use async_trait::async_trait;
use bulk_protocol::{Block, SinkKind};

/// Errors produced while emitting a block.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// I/O error while writing the block.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create the output directory.
    #[error("failed to create output directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One independent consumer of blocks.
///
/// Implementations are driven by a single worker task per sink kind, so
/// `emit` takes `&mut self` and never runs concurrently with itself.
#[async_trait]
pub trait BlockSink: Send {
    /// The sink kind this implementation serves.
    fn kind(&self) -> SinkKind;

    /// Render one block to the destination.
    ///
    /// Returning an error leaves the block unmarked in the delivery
    /// queue; the worker retries it later.
    async fn emit(&mut self, block: &Block) -> Result<(), SinkError>;
}
