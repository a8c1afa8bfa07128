//! Process-wide logging setup.
//!
//! Both binaries call [`init_telemetry`] once at startup. Verbosity follows
//! `RUST_LOG` (default `info`); `MEDQA_LOG_FORMAT=json` switches to one JSON
//! object per line for log shippers.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "MEDQA_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("unknown log format '{0}' (expected 'pretty' or 'json')")]
    Format(String),

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::Format(other.to_string())),
        }
    }
}

/// Install the global subscriber for `service`.
///
/// # Errors
///
/// Fails if `RUST_LOG` or `MEDQA_LOG_FORMAT` cannot be parsed, or if a
/// subscriber was already installed.
pub fn init_telemetry(service: &str) -> Result<(), TelemetryError> {
    let format = match std::env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(service, ?format, "telemetry initialized");
    Ok(())
}
