//! Layered configuration for the compiler worker.
//!
//! Values are merged from a configuration file, `COMPILER_WORKER_*`
//! environment variables and a small set of leading command-line flags using
//! `ortho_config`. Every field is optional; accessors fall back to the
//! defaults in [`defaults`] so a worker launched by the orchestrator with no
//! configuration at all behaves sensibly.

mod defaults;
mod logging;

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use worker_protocol::WireFormat;

pub use self::defaults::{
    DEFAULT_LOG_FILTER, UNBOUNDED_CONCURRENCY, default_log_filter, default_log_format,
    default_wire_format,
};
pub use self::logging::{LogFormat, LogFormatParseError};

/// Command-line flags consumed by the configuration loader.
///
/// Each flag takes a value, either inline (`--log-filter=debug`) or as the
/// following argument. They must precede the worker's positional arguments.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--wire-format",
    "--max-concurrent-requests",
];

/// Resolved worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COMPILER_WORKER")]
pub struct Config {
    /// `tracing` filter expression for worker diagnostics.
    pub log_filter: Option<String>,
    /// Layout of log lines written to standard error.
    pub log_format: Option<LogFormat>,
    /// Framing used on standard input and output.
    pub wire_format: Option<WireFormat>,
    /// Maximum number of compiler subprocesses running at once; `0` is unbounded.
    pub max_concurrent_requests: Option<usize>,
    /// Honour per-request sandbox directories instead of rejecting them.
    pub multiplex_sandboxing: Option<bool>,
}

impl Config {
    /// Loads configuration from the process arguments, environment and files.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any layer is malformed.
    pub fn load_layers<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::load_from_iter(args)
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the configured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Returns the configured wire format.
    #[must_use]
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format.unwrap_or_else(default_wire_format)
    }

    /// Returns the concurrency limit, or `None` when requests are unbounded.
    #[must_use]
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.max_concurrent_requests
            .filter(|limit| *limit != UNBOUNDED_CONCURRENCY)
    }

    /// Returns `true` when sandboxed requests should be executed.
    #[must_use]
    pub fn multiplex_sandboxing(&self) -> bool {
        self.multiplex_sandboxing.unwrap_or(false)
    }

    /// Returns a copy with the wire format overridden.
    #[must_use]
    pub const fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = Some(format);
        self
    }

    /// Returns a copy with a concurrency limit applied.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = Some(limit);
        self
    }

    /// Returns a copy with sandboxed multiplexing toggled.
    #[must_use]
    pub const fn with_multiplex_sandboxing(mut self, enabled: bool) -> Self {
        self.multiplex_sandboxing = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::default();
        assert_eq!(config.log_filter(), default_log_filter());
        assert_eq!(config.log_format(), default_log_format());
        assert_eq!(config.wire_format(), WireFormat::Proto);
        assert_eq!(config.concurrency_limit(), None);
        assert!(!config.multiplex_sandboxing());
    }

    #[rstest]
    #[case::zero_is_unbounded(0, None)]
    #[case::positive_limit(4, Some(4))]
    fn concurrency_limit_treats_zero_as_unbounded(
        #[case] limit: usize,
        #[case] expected: Option<usize>,
    ) {
        let config = Config::default().with_concurrency_limit(limit);
        assert_eq!(config.concurrency_limit(), expected);
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().expect("parse"), LogFormat::Json);
        assert_eq!(
            "compact".parse::<LogFormat>().expect("parse"),
            LogFormat::Compact
        );
    }

    #[test]
    fn builders_override_fields() {
        let config = Config::default()
            .with_wire_format(WireFormat::Json)
            .with_multiplex_sandboxing(true);
        assert_eq!(config.wire_format(), WireFormat::Json);
        assert!(config.multiplex_sandboxing());
    }
}
