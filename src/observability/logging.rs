//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once
//! - Pick the filter from `RUST_LOG`, falling back to the configured level
//! - Switch between human-readable and JSON output
//!
//! # Design Decisions
//! - Upstream URLs are logged as host and path only; query strings and
//!   userinfo may carry secrets and never reach a log line

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to initialize subscriber: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    format!("{level},media_proxy={level},tower_http={level}")
}

fn build_env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }
    Ok(EnvFilter::try_new(default_directives(level))?)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(&config.log_level)?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}
