//! Tracing subscriber setup.
//!
//! The engine itself only uses `tracing` macros. Applications that want the
//! output on stderr install a subscriber once with [`init_tracing`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable read for the log filter.
pub const LOG_ENV_VAR: &str = "STAGEFLOW_BACKTRACK_LOG";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, compact lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when the environment variable is unset.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Include span fields (run id, policy) in every line.
    #[serde(default)]
    pub with_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
            with_spans: false,
        }
    }
}

impl LogConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default filter.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enables span fields.
    #[must_use]
    pub fn with_spans(mut self, with_spans: bool) -> Self {
        self.with_spans = with_spans;
        self
    }

    /// Checks that `level` is a valid filter.
    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level)?;
        Ok(())
    }

    /// Builds the filter: the environment variable wins over `level`.
    pub fn filter(&self) -> Result<EnvFilter> {
        match std::env::var(LOG_ENV_VAR) {
            Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
            _ => Ok(EnvFilter::try_new(&self.level)?),
        }
    }
}

/// Installs a global stderr subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_target(config.with_spans),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(config.with_spans)
                    .with_span_list(config.with_spans),
            )
            .try_init()?,
    }
    Ok(())
}
