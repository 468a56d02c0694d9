//! Tracing subscriber setup.

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[log]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LogFormat,
    /// Filter expression, e.g. "info" or "ubs_daemon=debug,info". `RUST_LOG` wins if set.
    pub level: String,
    /// Include module targets in each line.
    pub with_targets: bool,
    /// Colored output; only honoured when stdout is a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
            with_targets: false,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggerError> {
        match EnvFilter::try_from_default_env() {
            Ok(f) => Ok(f),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|_| LoggerError::InvalidLevel(self.level.clone())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    #[error("logger already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once, before any worker starts.
pub fn init_logger(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = cfg.env_filter()?;
    match cfg.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.should_use_color())
                .with_target(cfg.with_targets);
            init_subscriber(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.with_targets);
            init_subscriber(tracing_subscriber::registry().with(filter).with(layer))
        }
    }
}

fn init_subscriber<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}
