//! Diagnostic logging for the worker.
//!
//! Standard output carries protocol frames, so every log line goes to
//! standard error.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use worker_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression is invalid.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// The rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another subscriber was already installed by the host process.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use; later calls are no-ops.
///
/// # Errors
///
/// Returns a [`TelemetryError`] when the filter does not parse or a foreign
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| ())
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
        filter: config.log_filter().to_owned(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_reported() {
        let config = Config {
            log_filter: Some(String::from("worker=loud")),
            ..Config::default()
        };
        let error = install_subscriber(&config).expect_err("filter rejected");
        assert!(matches!(error, TelemetryError::Filter { .. }));
        assert!(error.to_string().contains("worker=loud"));
    }

    #[test]
    fn repeated_initialisation_is_idempotent() {
        let config = Config::default();
        initialise(&config).expect("first initialisation");
        initialise(&config).expect("second initialisation");
    }
}
