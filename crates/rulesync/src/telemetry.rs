//! Logging setup for the binary.
//!
//! Library code logs through the `log` facade; those records are bridged
//! into `tracing` so they share the subscriber, filter and span context.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, RulesyncError};

/// Variable selecting the output format (`json` or anything else for text).
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<()> {
    tracing_log::LogTracer::init().map_err(|e| RulesyncError::Logging(e.to_string()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };

    result.map_err(|e| RulesyncError::Logging(e.to_string()))
}
