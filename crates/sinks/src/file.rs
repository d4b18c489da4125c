//! File Sink - One file per block
//!
//! Writes every block into its own file under the configured output
//! directory, one command per line. The filename is derived from the
//! block's creation timestamp plus its id, so two blocks created in the
//! same millisecond never collide:
//!
//! ```text
//! log/
//! ├── bulk1735900000123_1.log
//! ├── bulk1735900000123_2.log
//! └── bulk1735900001456_3.log
//! ```
//!
//! The directory is created on first emit if absent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bulk_protocol::{Block, SinkKind};

use crate::{BlockSink, SinkError};

/// Configuration for the file sink.
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory for block files.
    pub directory: PathBuf,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("log"),
        }
    }
}

impl FileSinkConfig {
    /// Config with a custom output directory.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

/// Metrics for the file sink.
#[derive(Debug, Default)]
struct FileMetrics {
    blocks_written: AtomicU64,
    commands_written: AtomicU64,
    bytes_written: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time snapshot of file sink metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMetricsSnapshot {
    pub blocks_written: u64,
    pub commands_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

/// File sink writing one file per block.
pub struct FileSink {
    config: FileSinkConfig,

    /// Set after the output directory has been created.
    directory_ready: bool,

    metrics: Arc<FileMetrics>,
}

impl FileSink {
    /// Create a file sink with the given config.
    pub fn new(config: FileSinkConfig) -> Self {
        Self {
            config,
            directory_ready: false,
            metrics: Arc::new(FileMetrics::default()),
        }
    }

    /// Current metrics snapshot.
    pub fn metrics_snapshot(&self) -> FileMetricsSnapshot {
        FileMetricsSnapshot {
            blocks_written: self.metrics.blocks_written.load(Ordering::Relaxed),
            commands_written: self.metrics.commands_written.load(Ordering::Relaxed),
            bytes_written: self.metrics.bytes_written.load(Ordering::Relaxed),
            write_errors: self.metrics.write_errors.load(Ordering::Relaxed),
        }
    }

    /// The output directory.
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Ensure the output directory exists.
    async fn ensure_directory(&mut self) -> Result<(), SinkError> {
        if self.directory_ready {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.config.directory)
            .await
            .map_err(|source| SinkError::CreateDir {
                path: self.config.directory.display().to_string(),
                source,
            })?;
        self.directory_ready = true;
        Ok(())
    }
}

/// Derive the file name for a block.
///
/// Deterministic from the block itself: creation time in epoch
/// milliseconds plus the block id.
pub(crate) fn block_file_name(block: &Block) -> String {
    format!("bulk{}_{}.log", block.created_at_millis(), block.id())
}

#[async_trait]
impl BlockSink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn emit(&mut self, block: &Block) -> Result<(), SinkError> {
        self.ensure_directory().await?;

        let path = self.config.directory.join(block_file_name(block));

        let mut contents = String::with_capacity(
            block.commands().iter().map(|c| c.len() + 1).sum::<usize>(),
        );
        for command in block.commands() {
            contents.push_str(command);
            contents.push('\n');
        }

        if let Err(e) = tokio::fs::write(&path, contents.as_bytes()).await {
            self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(path = %path.display(), error = %e, "block write failed");
            return Err(e.into());
        }

        self.metrics.blocks_written.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .commands_written
            .fetch_add(block.len() as u64, Ordering::Relaxed);
        self.metrics
            .bytes_written
            .fetch_add(contents.len() as u64, Ordering::Relaxed);

        tracing::debug!(
            block_id = %block.id(),
            commands = block.len(),
            path = %path.display(),
            "block written"
        );

        Ok(())
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
