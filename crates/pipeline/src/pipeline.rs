//! Pipeline facade - connect, receive, disconnect, terminate
//!
//! Owns the connection registry, the shared static aggregator, the
//! delivery queue, and the worker pool. `receive` classifies each line
//! under the registry lock and then flushes outside it, so the queue is
//! never touched while per-connection state is held.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bulk_protocol::{classify, Token};
use bulk_sinks::{BlockSink, ConsoleConfig, ConsoleSink, FileSink, FileSinkConfig};

use crate::aggregator::StaticAggregator;
use crate::error::{PipelineError, Result};
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use crate::queue::DeliveryQueue;
use crate::registry::{ConnectionRegistry, Handle, ScopeClose};
use crate::workers::WorkerPool;
use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_SHUTDOWN_GRACE};

/// Pipeline construction parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Static block size used until the first connection overrides it.
    pub block_size: NonZeroUsize,
    pub console: ConsoleConfig,
    pub file: FileSinkConfig,
    /// How long `terminate` waits for the queue to drain.
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: NonZeroUsize::new(DEFAULT_BLOCK_SIZE).unwrap_or(NonZeroUsize::MIN),
            console: ConsoleConfig::default(),
            file: FileSinkConfig::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// What a classified line asks the pipeline to do, decided under the
/// registry lock and acted on after it is released.
enum Action {
    Static(String),
    Flush(Vec<String>),
    None,
    Violation,
}

/// The in-process bulk broker.
pub struct Pipeline {
    config: PipelineConfig,
    registry: ConnectionRegistry,
    aggregator: StaticAggregator,
    queue: Arc<DeliveryQueue>,
    workers: WorkerPool,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let aggregator = StaticAggregator::new(config.block_size);
        Self {
            config,
            registry: ConnectionRegistry::new(),
            aggregator,
            queue: Arc::new(DeliveryQueue::new()),
            workers: WorkerPool::new(),
            metrics: PipelineMetrics::new(),
        }
    }

    /// Spawn the sink workers.
    ///
    /// Called once before producers are admitted; later calls are
    /// no-ops. Blocks appended before `start` sit in the queue and are
    /// picked up by the workers' first fetch.
    pub fn start(&self) -> bool {
        let sinks: Vec<Box<dyn BlockSink>> = vec![
            Box::new(ConsoleSink::new(self.config.console.clone())),
            Box::new(FileSink::new(self.config.file.clone())),
        ];
        self.workers.start(Arc::clone(&self.queue), sinks)
    }

    /// Register a producer connection.
    ///
    /// The first connection's block size becomes the shared static
    /// threshold; later sizes are ignored once commands are in flight.
    pub fn connect(&self, block_size: NonZeroUsize) -> Handle {
        self.aggregator.set_block_size_once(block_size);
        let handle = self.registry.create();
        self.metrics
            .connections_opened
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::info!(
            %handle,
            block_size = block_size.get(),
            connections = self.registry.len(),
            "producer connected"
        );
        handle
    }

    /// Feed one line from a producer.
    ///
    /// Empty lines are ignored. A close delimiter with no matching open
    /// returns `ProtocolViolation` with connection state unchanged.
    pub fn receive(&self, handle: Handle, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        self.metrics
            .commands_received
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let action = self.registry.with_state(handle, |state| match classify(line) {
            Token::ScopeOpen => {
                state.open_scope();
                Action::None
            }
            Token::ScopeClose => match state.close_scope() {
                ScopeClose::Flushed(commands) => Action::Flush(commands),
                ScopeClose::StillNested => Action::None,
                ScopeClose::Underflow => Action::Violation,
            },
            Token::Command(text) => {
                if state.at_top_level() {
                    Action::Static(text.to_owned())
                } else {
                    state.push_pending(text.to_owned());
                    Action::None
                }
            }
        })?;

        match action {
            Action::Static(command) => {
                if let Some(commands) = self.aggregator.submit(command) {
                    self.metrics
                        .static_blocks
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    self.append_block(commands);
                }
                Ok(())
            }
            Action::Flush(commands) => {
                if self.append_block(commands) {
                    self.metrics
                        .scope_blocks
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(())
            }
            Action::None => Ok(()),
            Action::Violation => {
                self.metrics
                    .protocol_violations
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::error!(%handle, "unpaired close delimiter");
                Err(PipelineError::ProtocolViolation { handle })
            }
        }
    }

    /// Retire a connection, force-flushing any open scope.
    ///
    /// Commands buffered in an unclosed scope become a block despite
    /// the missing close delimiter. The shared static sequence is not
    /// touched - other producers are still feeding it.
    pub fn disconnect(&self, handle: Handle) -> Result<()> {
        let mut state = self
            .registry
            .remove(handle)
            .ok_or(PipelineError::UnknownHandle(handle))?;
        self.metrics
            .connections_closed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let pending = state.take_pending();
        if !pending.is_empty() {
            tracing::info!(
                %handle,
                commands = pending.len(),
                depth = state.nesting_depth(),
                "flushing open scope on disconnect"
            );
            self.metrics
                .forced_blocks
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.append_block(pending);
        }

        tracing::info!(%handle, connections = self.registry.len(), "producer disconnected");
        Ok(())
    }

    /// Drop a connection without flushing its scope (violation path).
    pub fn abort(&self, handle: Handle) -> bool {
        let removed = self.registry.remove(handle).is_some();
        if removed {
            self.metrics
                .connections_closed
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(%handle, "producer aborted, scope discarded");
        }
        removed
    }

    /// Shut the pipeline down.
    ///
    /// Disconnects every remaining producer (flushing their scopes),
    /// flushes the partial static group, then waits up to the grace
    /// period for the queue to drain before stopping the workers.
    /// Best-effort: blocks still queued at the deadline are logged and
    /// dropped with the process.
    pub async fn terminate(&self) {
        for handle in self.registry.handles() {
            // Cannot fail: handles() only returns live registrations
            let _ = self.disconnect(handle);
        }

        let remainder = self.aggregator.drain();
        if !remainder.is_empty() {
            self.metrics
                .forced_blocks
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.append_block(remainder);
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while !self.queue.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let undelivered = self.queue.len();
        if undelivered > 0 {
            tracing::warn!(undelivered, "queue not drained within shutdown grace");
        }

        self.workers.stop();

        let snap = self.metrics.snapshot();
        tracing::info!(
            commands = snap.commands_received,
            blocks = snap.total_blocks(),
            violations = snap.protocol_violations,
            "pipeline terminated"
        );
    }

    fn append_block(&self, commands: Vec<String>) -> bool {
        // Empty flushes (e.g. `{` immediately followed by `}`) produce
        // no block at all
        if commands.is_empty() {
            return false;
        }
        self.queue.append(commands);
        true
    }

    /// Currently effective static block size.
    pub fn block_size(&self) -> NonZeroUsize {
        self.aggregator.block_size()
    }

    /// The delivery queue shared with the workers.
    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of live producer connections.
    pub fn connections(&self) -> usize {
        self.registry.len()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
