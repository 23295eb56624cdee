use worker_protocol::WireFormat;

use crate::logging::LogFormat;

/// Default log filter expression used by the worker.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Concurrency limit meaning "no limit".
pub const UNBOUNDED_CONCURRENCY: usize = 0;

/// Default log filter expression used by the worker.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the worker.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default wire format; the orchestrator speaks protobuf unless told otherwise.
#[must_use]
pub const fn default_wire_format() -> WireFormat {
    WireFormat::Proto
}
