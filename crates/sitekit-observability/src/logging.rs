//! Logging bootstrap.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sitekit_core::RuntimeMode;
use tracing_subscriber::EnvFilter;

/// Output format for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

impl LogFormat {
    /// JSON in production, human-readable elsewhere.
    pub fn for_mode(mode: RuntimeMode) -> Self {
        if mode.is_production() {
            Self::Json
        } else {
            Self::Human
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Human => write!(f, "human"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "human" | "pretty" | "text" => Ok(Self::Human),
            other => anyhow::bail!("unknown log format: {other}"),
        }
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(mode: RuntimeMode) -> &'static str {
    match mode {
        RuntimeMode::Development => "debug",
        RuntimeMode::Test => "warn",
        RuntimeMode::Production => "info",
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the mode's default filter. Fails if a global
/// subscriber is already installed.
pub fn init_logging(mode: RuntimeMode, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(mode)));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Human => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    tracing::debug!(mode = %mode, format = %format, "logging initialized");
    Ok(())
}
