//! Log output formats for the worker's diagnostics stream.
//!
//! Standard output carries response frames only, so every format renders to
//! standard error.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How diagnostics are rendered on standard error.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for orchestrators that collect worker logs.
    Json,
    /// Single-line human-readable events; the default for interactive runs.
    #[default]
    Compact,
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;
