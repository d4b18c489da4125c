//! bulk-client - test producer for bulkd
//!
//! Sends command lines to a running bulkd, either auto-generated or
//! read from stdin, and finishes with the explicit disconnect byte.
//!
//! # Usage
//!
//! ```bash
//! # Send 9 generated commands
//! bulk-client --count 9
//!
//! # Send a delimiter-scoped group, pacing the commands
//! bulk-client --count 4 --scope --delay-ms 100
//!
//! # Interactive: type commands, end with ctrl-d
//! bulk-client --port 9123
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use bulk_protocol::DISCONNECT_BYTE;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Test producer for bulkd
#[derive(Parser, Debug)]
#[command(name = "bulk-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, default_value = "127.0.0.1")]
    addr: String,

    /// Server port
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Send this many generated commands instead of reading stdin
    #[arg(short, long)]
    count: Option<usize>,

    /// Prefix for generated commands
    #[arg(long, default_value = "cmd")]
    prefix: String,

    /// Wrap the generated commands in a delimiter scope
    #[arg(long)]
    scope: bool,

    /// Delay between generated commands, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Close the socket without the explicit disconnect byte
    #[arg(long)]
    no_disconnect: bool,
}

/// Build the command lines for `--count` mode.
fn generated_lines(prefix: &str, count: usize, scope: bool) -> Vec<String> {
    let mut lines = Vec::with_capacity(count + 2);
    if scope {
        lines.push("{".to_string());
    }
    for i in 1..=count {
        lines.push(format!("{prefix}{i}"));
    }
    if scope {
        lines.push("}".to_string());
    }
    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut stream = TcpStream::connect((cli.addr.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.addr, cli.port))?;

    match cli.count {
        Some(count) => {
            let delay = Duration::from_millis(cli.delay_ms);
            for line in generated_lines(&cli.prefix, count, cli.scope) {
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
                if !delay.is_zero() {
                    stream.flush().await?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
                stream.flush().await?;
            }
        }
    }

    if !cli.no_disconnect {
        stream.write_all(&[DISCONNECT_BYTE]).await?;
    }
    stream.flush().await?;

    Ok(())
}
