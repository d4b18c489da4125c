//! Console Sink - Human-readable block output
//!
//! Writes each command of a block to stdout on its own line, optionally
//! bracketed by dimmed scope delimiters for readability:
//!
//! ```text
//! { block 3 @ 13:04:05.123
//! cmd1
//! cmd2
//! }
//! ```
//!
//! Not intended for high-throughput use; it exists so an operator can
//! watch blocks forming in real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bulk_protocol::{Block, SinkKind};
use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Style};
use tokio::io::AsyncWriteExt;

use crate::{BlockSink, SinkError};

/// Configuration for the console sink.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Enable dimmed styling of the delimiter lines.
    pub color: bool,

    /// Bracket each block with `{` / `}` delimiter lines.
    pub delimiters: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            color: true,
            delimiters: true,
        }
    }
}

impl ConsoleConfig {
    /// Config with colors disabled (for piped output).
    pub fn no_color() -> Self {
        Self {
            color: false,
            ..Self::default()
        }
    }
}

/// Metrics for the console sink.
#[derive(Debug, Default)]
struct ConsoleMetrics {
    blocks_emitted: AtomicU64,
    commands_emitted: AtomicU64,
}

/// Point-in-time snapshot of console sink metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleMetricsSnapshot {
    pub blocks_emitted: u64,
    pub commands_emitted: u64,
}

/// Console sink writing blocks to stdout.
pub struct ConsoleSink {
    config: ConsoleConfig,
    metrics: Arc<ConsoleMetrics>,
}

impl ConsoleSink {
    /// Create a console sink with the given config.
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(ConsoleMetrics::default()),
        }
    }

    /// Current metrics snapshot.
    pub fn metrics_snapshot(&self) -> ConsoleMetricsSnapshot {
        ConsoleMetricsSnapshot {
            blocks_emitted: self.metrics.blocks_emitted.load(Ordering::Relaxed),
            commands_emitted: self.metrics.commands_emitted.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl BlockSink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    async fn emit(&mut self, block: &Block) -> Result<(), SinkError> {
        let rendered = render_block(block, &self.config);

        // One buffered write per block keeps the output contiguous even
        // with other writers on the same terminal.
        let mut stdout = tokio::io::stdout();
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.flush().await?;

        self.metrics.blocks_emitted.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .commands_emitted
            .fetch_add(block.len() as u64, Ordering::Relaxed);

        Ok(())
    }
}

/// Render a block to its console text form.
fn render_block(block: &Block, config: &ConsoleConfig) -> String {
    let label_style = if config.color {
        Style::new().dimmed()
    } else {
        Style::new()
    };

    let mut out = String::with_capacity(64 + block.commands().iter().map(|c| c.len() + 1).sum::<usize>());

    if config.delimiters {
        let header = format!(
            "{{ block {} @ {}",
            block.len(),
            header_timestamp(block.created_at())
        );
        out.push_str(&format!("{}\n", header.style(label_style)));
    }

    for command in block.commands() {
        out.push_str(command);
        out.push('\n');
    }

    if config.delimiters {
        out.push_str(&format!("{}\n", "}".style(label_style)));
    }

    out
}

/// Wall-clock part of the block header, millisecond precision.
fn header_timestamp(created_at: DateTime<Utc>) -> String {
    created_at.format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_protocol::BlockId;
    use chrono::TimeZone;

    fn test_block() -> Block {
        Block::new(BlockId(1), vec!["cmd1".into(), "cmd2".into()])
    }

    #[test]
    fn test_render_with_delimiters() {
        let config = ConsoleConfig {
            color: false,
            delimiters: true,
        };
        let rendered = render_block(&test_block(), &config);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("{ block 2 @ "));
        assert_eq!(lines[1], "cmd1");
        assert_eq!(lines[2], "cmd2");
        assert_eq!(lines[3], "}");
    }

    #[test]
    fn test_header_timestamp_millisecond_precision() {
        let ts = Utc
            .with_ymd_and_hms(2026, 8, 30, 12, 34, 56)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(789))
            .unwrap();
        assert_eq!(header_timestamp(ts), "12:34:56.789");
    }

    #[test]
    fn test_render_bare() {
        let config = ConsoleConfig {
            color: false,
            delimiters: false,
        };
        let rendered = render_block(&test_block(), &config);
        assert_eq!(rendered, "cmd1\ncmd2\n");
    }

    #[tokio::test]
    async fn test_emit_records_metrics() {
        let mut sink = ConsoleSink::new(ConsoleConfig::no_color());
        sink.emit(&test_block()).await.unwrap();
        sink.emit(&test_block()).await.unwrap();

        let snapshot = sink.metrics_snapshot();
        assert_eq!(snapshot.blocks_emitted, 2);
        assert_eq!(snapshot.commands_emitted, 4);
    }
}
