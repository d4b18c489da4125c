//! TCP server - producer accept loop and connection driver
//!
//! Binds one listener, registers every accepted connection with the
//! pipeline, and pumps decoded lines into `Pipeline::receive`. Each
//! connection runs in its own task; the reading half is generic over
//! `AsyncRead` so the driver is testable without sockets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulk_pipeline::{Handle, Pipeline, PipelineError};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::decode::{DecodedItem, LineDecoder};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// What to do with a connection that sends an unpaired close delimiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Exit the whole process with status 2. Matches the strict
    /// historical contract: a violated stream means block attribution
    /// can no longer be trusted.
    #[default]
    Abort,
    /// Drop only the offending connection, discarding its open scope.
    CloseConnection,
}

/// TCP server configuration.
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// Bind address (e.g. "0.0.0.0").
    pub address: String,

    /// Listen port.
    pub port: u16,

    /// Read buffer size per connection.
    pub buffer_size: usize,

    /// TCP nodelay (disable Nagle's algorithm).
    pub nodelay: bool,

    pub violation_policy: ViolationPolicy,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 9000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            nodelay: true,
            violation_policy: ViolationPolicy::default(),
        }
    }
}

impl TcpServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The socket address to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// TCP server errors
#[derive(Debug, thiserror::Error)]
pub enum TcpServerError {
    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level counters.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub connections_active: AtomicU64,
    pub connections_total: AtomicU64,
    pub bytes_received: AtomicU64,
    pub lines_received: AtomicU64,
    pub violations: AtomicU64,
}

impl ServerMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    #[inline]
    fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`ServerMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct ServerMetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub bytes_received: u64,
    pub lines_received: u64,
    pub violations: u64,
}

/// How a connection ended.
#[derive(Debug, PartialEq, Eq)]
enum ConnectionOutcome {
    /// Clean end: the disconnect byte (explicit) or EOF.
    Disconnected { explicit: bool },
    /// The pipeline reported an unpaired close delimiter.
    Violation,
}

/// Line-oriented TCP front end over a shared [`Pipeline`].
pub struct TcpServer {
    config: TcpServerConfig,
    pipeline: Arc<Pipeline>,
    metrics: Arc<ServerMetrics>,
}

impl TcpServer {
    pub fn new(config: TcpServerConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind and accept until cancelled.
    ///
    /// Starts the pipeline workers before admitting the first producer,
    /// so nothing a connection flushes can sit unobserved.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TcpServerError> {
        self.pipeline.start();

        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TcpServerError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %bind_addr,
            block_size = self.pipeline.block_size().get(),
            violation_policy = ?self.config.violation_policy,
            "server listening"
        );

        let server = Arc::new(self);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            server.metrics.connection_opened();
                            let server = Arc::clone(&server);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, cancel).await {
                                    tracing::debug!(peer = %peer_addr, error = %e, "connection error");
                                }
                                server.metrics.connection_closed();
                            });
                        }
                        Err(e) => {
                            // Transient accept errors - log and continue
                            tracing::warn!(error = %e, "accept error");
                        }
                    }
                }
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        cancel: CancellationToken,
    ) -> Result<(), TcpServerError> {
        if self.config.nodelay && stream.set_nodelay(true).is_err() {
            tracing::debug!("failed to set TCP_NODELAY");
        }

        let block_size = self.pipeline.block_size();
        let handle = self.pipeline.connect(block_size);

        let outcome = drive_connection(
            &self.pipeline,
            handle,
            stream,
            self.config.buffer_size,
            &self.metrics,
            &cancel,
        )
        .await;

        match outcome {
            Ok(ConnectionOutcome::Disconnected { explicit }) => {
                if let Err(e) = self.pipeline.disconnect(handle) {
                    tracing::warn!(%handle, error = %e, "disconnect after retirement");
                }
                tracing::debug!(%handle, explicit, "connection closed");
                Ok(())
            }
            Ok(ConnectionOutcome::Violation) => {
                self.metrics.violations.fetch_add(1, Ordering::Relaxed);
                match self.config.violation_policy {
                    ViolationPolicy::Abort => {
                        tracing::error!(%handle, "protocol violation, aborting");
                        std::process::exit(2);
                    }
                    ViolationPolicy::CloseConnection => {
                        self.pipeline.abort(handle);
                        Ok(())
                    }
                }
            }
            Err(e) => {
                // Socket died mid-stream; treat like EOF
                let _ = self.pipeline.disconnect(handle);
                Err(e.into())
            }
        }
    }
}

/// Pump decoded lines from `reader` into the pipeline.
async fn drive_connection<R: AsyncRead + Unpin>(
    pipeline: &Pipeline,
    handle: Handle,
    mut reader: R,
    buffer_size: usize,
    metrics: &ServerMetrics,
    cancel: &CancellationToken,
) -> Result<ConnectionOutcome, std::io::Error> {
    let mut chunk = BytesMut::with_capacity(buffer_size);
    let mut decoder = LineDecoder::new();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(ConnectionOutcome::Disconnected { explicit: false }),
            read = reader.read_buf(&mut chunk) => read?,
        };

        if read == 0 {
            // EOF ends the connection like an explicit disconnect
            return Ok(ConnectionOutcome::Disconnected { explicit: false });
        }

        metrics.bytes_received.fetch_add(read as u64, Ordering::Relaxed);
        decoder.extend(&chunk);
        chunk.clear();

        while let Some(item) = decoder.next_item() {
            match item {
                DecodedItem::Line(line) => {
                    metrics.lines_received.fetch_add(1, Ordering::Relaxed);
                    match pipeline.receive(handle, &line) {
                        Ok(()) => {}
                        Err(PipelineError::ProtocolViolation { .. }) => {
                            return Ok(ConnectionOutcome::Violation);
                        }
                        Err(e @ PipelineError::UnknownHandle(_)) => {
                            // Registry lost the handle under us; stop reading
                            tracing::warn!(%handle, error = %e, "stale connection handle");
                            return Ok(ConnectionOutcome::Disconnected { explicit: false });
                        }
                    }
                }
                DecodedItem::Disconnect => {
                    return Ok(ConnectionOutcome::Disconnected { explicit: true });
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tcp_test;
