//! bulkd - Bulk command batching broker
//!
//! Accepts line-oriented commands over TCP, groups them into blocks,
//! and delivers every block to the console and to one file per block.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (port 9000, block size 5)
//! bulkd
//!
//! # Custom port and block size
//! bulkd --port 9123 --block-size 3
//!
//! # From a config file, with a CLI override on top
//! bulkd --config configs/bulkd.toml --log-level debug
//! ```

mod config;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bulk_pipeline::{Pipeline, PipelineConfig};
use bulk_server::{TcpServer, TcpServerConfig, ViolationPolicy};
use bulk_sinks::{ConsoleConfig, FileSinkConfig};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, ViolationAction};

/// Bulk command batching broker
#[derive(Parser, Debug)]
#[command(name = "bulkd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address. Overrides config file.
    #[arg(long)]
    addr: Option<String>,

    /// Listen port. Overrides config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Commands per static block. Overrides config file.
    #[arg(short, long)]
    block_size: Option<usize>,

    /// Block file output directory. Overrides config file.
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Keep stale block files in the output directory at startup
    #[arg(long)]
    keep_output_dir: bool,

    /// Drop only the offending connection on a protocol violation
    /// instead of exiting
    #[arg(long)]
    forgive_violations: bool,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.log.level)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?
        .block_on(run(config))
}

/// Merge the config file (or defaults) with CLI overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")?
        }
        None => Config::default(),
    };

    if let Some(addr) = &cli.addr {
        config.server.address = addr.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(block_size) = cli.block_size {
        anyhow::ensure!(block_size > 0, "block size must be at least 1");
        config.server.block_size = block_size;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }
    if cli.keep_output_dir {
        config.output.clean_on_start = false;
    }
    if cli.forgive_violations {
        config.server.on_violation = ViolationAction::CloseConnection;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        port = config.server.port,
        block_size = config.server.block_size,
        output_dir = %config.output.directory,
        "bulkd starting"
    );

    if config.output.clean_on_start {
        clean_output_dir(&config.output.directory)?;
    }

    // Validated by load_config / Config::validate
    let block_size = NonZeroUsize::new(config.server.block_size)
        .context("block size must be at least 1")?;

    let console = if config.output.color {
        ConsoleConfig::default()
    } else {
        ConsoleConfig::no_color()
    };

    let pipeline = Arc::new(Pipeline::new(PipelineConfig {
        block_size,
        console: ConsoleConfig {
            delimiters: config.output.delimiters,
            ..console
        },
        file: FileSinkConfig::with_directory(&config.output.directory),
        shutdown_grace: Duration::from_millis(config.shutdown.grace_ms),
    }));

    let server = TcpServer::new(
        TcpServerConfig {
            address: config.server.address.clone(),
            port: config.server.port,
            violation_policy: match config.server.on_violation {
                ViolationAction::Abort => ViolationPolicy::Abort,
                ViolationAction::CloseConnection => ViolationPolicy::CloseConnection,
            },
            ..TcpServerConfig::default()
        },
        Arc::clone(&pipeline),
    );

    let cancel = CancellationToken::new();
    let server_task = tokio::spawn(server.run(cancel.clone()));

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    cancel.cancel();
    pipeline.terminate().await;

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("server error"),
        Err(e) => warn!(error = %e, "server task panicked"),
    }

    info!("bulkd stopped");
    Ok(())
}

/// Remove stale block files from a previous run.
///
/// Only files matching the sink's `bulk*.log` naming are touched; the
/// directory itself and anything else in it stay.
fn clean_output_dir(directory: &str) -> Result<()> {
    let dir = std::path::Path::new(directory);
    if !dir.is_dir() {
        return Ok(());
    }

    let mut removed = 0usize;
    for entry in std::fs::read_dir(dir).context("failed to read output directory")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("bulk") && name.ends_with(".log") {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, directory, "cleaned stale block files");
    }
    Ok(())
}

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr: stdout belongs to the console sink's block
/// output, and diagnostics (protocol violations included) must not
/// interleave with it.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
