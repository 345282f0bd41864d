//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence; otherwise the
//! configured level applies to this crate and `tower_http`.

use tracing::{warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::LoggingSettings;
use crate::core::error::{BalancerError, BalancerResult};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> BalancerResult<Self> {
        match format.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(BalancerError::config(format!("Invalid log format: {}", other))),
        }
    }
}

pub fn parse_level(level: &str) -> BalancerResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(BalancerError::config(format!("Invalid log level: {}", other))),
    }
}

/// Build the filter: `RUST_LOG` if set, else the configured level for our targets
fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_lowercase();
        EnvFilter::new(format!("route_balancer={level},tower_http={level},warn"))
    })
}

/// Initialize the tracing subscriber.
///
/// Calling this twice is tolerated: the second call logs a warning and keeps the first
/// subscriber.
pub fn init_logging(settings: &LoggingSettings) -> BalancerResult<()> {
    let level = parse_level(&settings.level)?;
    let format = LogFormat::parse(&settings.format)?;
    let filter = env_filter(level);

    let result = match format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}
