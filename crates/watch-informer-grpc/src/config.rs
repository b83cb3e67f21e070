//! Command-line configuration and logging setup.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use watch_informer::{DEFAULT_QUEUE_CAPACITY, SessionConfig};

/// Watch Informer - streams Kubernetes watch events over gRPC
#[derive(Parser, Debug, Clone)]
#[command(name = "watch-informer")]
#[command(about = "Starts the watch-informer gRPC server")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "WATCH_INFORMER_ADDR", default_value = "0.0.0.0:50051")]
    pub addr: SocketAddr,

    /// Log level
    #[arg(
        short = 'l',
        long,
        env = "WATCH_INFORMER_LOG_LEVEL",
        value_enum,
        default_value_t = LogLevel::Info
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(
        long,
        env = "WATCH_INFORMER_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Json
    )]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stdout
    #[arg(long, env = "WATCH_INFORMER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Events buffered per session before new events are dropped
    #[arg(
        long,
        env = "WATCH_INFORMER_QUEUE_CAPACITY",
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        value_parser = parse_capacity
    )]
    pub queue_capacity: usize,

    /// Pluralize resource names mechanically instead of asking the cluster
    #[arg(long)]
    pub no_discovery: bool,
}

impl Config {
    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            queue_capacity: self.queue_capacity,
        }
    }
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("queue capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Minimum level of log events to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Everything, including each forwarded event
    Debug,
    /// Session lifecycle
    Info,
    /// Dropped events and recoverable failures
    Warn,
    /// Failures only
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives take precedence over the configured level.
pub fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.log_level).into())
        .from_env_lossy();

    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()?,
        LogFormat::Text => registry.with(fmt::layer().with_writer(writer)).try_init()?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["watch-informer"]).unwrap();
        assert_eq!(config.addr, "0.0.0.0:50051".parse().unwrap());
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.log_file.is_none());
        assert!(!config.no_discovery);
    }

    #[test]
    fn parses_flags() {
        let config = Config::try_parse_from([
            "watch-informer",
            "-l",
            "debug",
            "--addr",
            "127.0.0.1:9000",
            "--log-format",
            "text",
            "--queue-capacity",
            "5",
            "--no-discovery",
        ])
        .unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.session_config().queue_capacity, 5);
        assert!(config.no_discovery);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(Config::try_parse_from(["watch-informer", "--queue-capacity", "0"]).is_err());
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(Config::try_parse_from(["watch-informer", "-l", "verbose"]).is_err());
    }

    #[test]
    fn level_maps_to_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::try_parse_from([
            "watch-informer",
            "--log-file",
            dir.path().join("missing").join("log.json").to_str().unwrap(),
        ])
        .unwrap();
        assert!(init_logging(&config).is_err());
    }
}
