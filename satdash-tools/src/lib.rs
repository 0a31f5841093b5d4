use clap::Parser;
use satdash::link::port::{self, serial};
use satdash::link::proto::DEFAULT_HANDSHAKE;
use satdash::link::{LineSource, LinkError};
use satdash::pipeline::IngestConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Serial link used when neither the command line nor the config file
/// names one.
pub fn default_port_url() -> String {
    let port = if cfg!(windows) { "COM5" } else { "/dev/ttyUSB0" };
    format!("{}:{}", port, serial::DEFAULT_RATE)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Settings shared by the tools, optionally loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Link url, see `satdash::link::port::open`.
    pub port: String,
    pub handshake: String,
    /// Dashboard refresh period in milliseconds.
    pub tick_ms: u64,
    /// Directory for the per-kind CSV logs.
    pub output_dir: PathBuf,
    /// Pause after a retryable link error, in milliseconds.
    pub retry_ms: u64,
    /// Upper bound on a single serial read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port_url(),
            handshake: DEFAULT_HANDSHAKE.to_string(),
            tick_ms: 35,
            output_dir: PathBuf::from("."),
            retry_ms: 10,
            read_timeout_ms: 100,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IO {
            path: path.to_path_buf(),
            source,
        })?;
        Config::parse(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Config, serde_yaml::Error> {
        // An empty document means "all defaults".
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            handshake: self.handshake.clone(),
            retry_delay: Duration::from_millis(self.retry_ms),
        }
    }

    pub fn open_link(&self) -> Result<Box<dyn LineSource + Send>, LinkError> {
        port::open(&self.port, self.read_timeout())
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub struct LinkOpts {
    /// Telemetry link (e.g., COM5:115200, /dev/ttyUSB0, file://capture.txt, -)
    #[arg(
        short = 'p',
        long = "port",
        help = format!("Telemetry link [default: {}]", default_port_url())
    )]
    pub port: Option<String>,

    /// Frame handshake token
    #[arg(long = "handshake", help = format!("Frame handshake token [default: {}]", DEFAULT_HANDSHAKE))]
    pub handshake: Option<String>,

    /// YAML configuration file
    #[arg(short = 'c', long = "config", help = "YAML configuration file")]
    pub config: Option<PathBuf>,
}

impl LinkOpts {
    /// Loads the config file, if any, and applies command line overrides.
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(handshake) = &self.handshake {
            config.handshake = handshake.clone();
        }
        Ok(config)
    }
}

/// Sets up `env_logger`, with `default_level` unless `RUST_LOG` says
/// otherwise.
pub fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}
