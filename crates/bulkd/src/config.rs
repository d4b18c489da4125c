//! Daemon configuration
//!
//! TOML-based configuration with sensible defaults. A minimal config
//! should just work - only specify what you need to change.
//!
//! ```toml
//! [server]
//! port = 9000
//! block_size = 5
//!
//! [output]
//! directory = "log"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("block_size must be at least 1")]
    ZeroBlockSize,
}

/// Main configuration structure. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Commands per static block
    pub block_size: usize,

    /// What to do with a producer that sends an unpaired `}`
    pub on_violation: ViolationAction,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 9000,
            block_size: 5,
            on_violation: ViolationAction::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationAction {
    Abort,
    CloseConnection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory block files are written to
    pub directory: String,

    /// Remove stale block files from the directory at startup
    pub clean_on_start: bool,

    /// Colorize console output
    pub color: bool,

    /// Print the `{` / `}` frame around console blocks
    pub delimiters: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "log".into(),
            clean_on_start: true,
            color: true,
            delimiters: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for queued blocks to drain, in milliseconds
    pub grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_ms: 1000 }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.server.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
