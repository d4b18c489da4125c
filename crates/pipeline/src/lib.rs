//! Bulk Pipeline - Command batching and multi-sink fan-out
//!
//! The core of the bulk broker. Line-oriented commands arrive from many
//! concurrent producers, are grouped into ordered blocks under two
//! rules, and every block is delivered to every configured sink before
//! its memory is reclaimed.
//!
//! # Architecture
//!
//! ```text
//! [Producers]            [Pipeline]                           [Sinks]
//!   conn 1 ──┐   receive ──→ classify ──→ static aggregator ─┐
//!   conn 2 ──┼──────────────────│                            ├─→ DeliveryQueue ──→ console worker ──→ stdout
//!   conn 3 ──┘                  └──→ connection state ───────┘        │
//!                                     (scope pending)                 └─────────→ file worker ──→ log/
//! ```
//!
//! # Grouping rules
//!
//! - **Static**: commands arriving outside any delimiter scope join one
//!   global sequence shared by all producers; a block flushes when the
//!   sequence reaches the configured size exactly.
//! - **Delimiter-scoped**: commands between a matching `{` / `}` pair
//!   on one connection form a block flushed when the scope closes at
//!   nesting depth zero.
//!
//! # Delivery
//!
//! Each appended block carries a per-sink delivery mask. One worker
//! task per sink kind drains the queue independently; an entry is
//! reclaimed only once every kind has marked it delivered.

mod aggregator;
mod error;
mod metrics;
mod pipeline;
mod queue;
mod registry;
mod workers;

pub use aggregator::StaticAggregator;
pub use error::{PipelineError, Result};
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use pipeline::{Pipeline, PipelineConfig};
pub use queue::{DeliveryQueue, QueueMetricsSnapshot};
pub use registry::{ConnectionRegistry, ConnectionState, Handle, ScopeClose};
pub use workers::WorkerPool;

/// Default number of commands per static block.
pub const DEFAULT_BLOCK_SIZE: usize = 5;

/// Default grace period `terminate` waits for the queue to drain.
pub const DEFAULT_SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(1);
