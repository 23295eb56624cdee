//! Work request and response messages exchanged with the build orchestrator.
//!
//! The field numbers mirror the orchestrator's `worker_protocol.proto`, so the
//! same structs serve both the protobuf wire format (through `prost`) and the
//! JSON wire format (through `serde`, using the camelCase field names the
//! orchestrator emits).

use prost::Message;
use serde::{Deserialize, Serialize};

/// An input file made available to the compiler for a single request.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Input {
    /// Path of the input file, relative to the execution root.
    #[prost(string, tag = "1")]
    pub path: String,
    /// Content digest supplied by the orchestrator. Base64 in JSON frames.
    #[prost(bytes = "vec", tag = "2")]
    #[serde(with = "base64_bytes")]
    pub digest: Vec<u8>,
}

/// Protobuf's JSON mapping carries `bytes` fields as standard base64 strings.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}

/// A single compile request read from the worker's standard input.
///
/// # Example
///
/// ```
/// use worker_protocol::WorkRequest;
///
/// let request = WorkRequest::new(7, vec!["-nologo".into()]);
/// assert_eq!(request.request_id, 7);
/// assert!(!request.is_sandboxed());
/// assert!(!request.cancel);
/// ```
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkRequest {
    /// Compiler arguments for this unit of work.
    #[prost(string, repeated, tag = "1")]
    pub arguments: Vec<String>,
    /// Inputs declared by the orchestrator. Informational only.
    #[prost(message, repeated, tag = "2")]
    pub inputs: Vec<Input>,
    /// Caller-assigned identifier, echoed back unchanged in the response.
    #[prost(int32, tag = "3")]
    pub request_id: i32,
    /// Marks this message as a cancellation of `request_id`.
    #[prost(bool, tag = "4")]
    pub cancel: bool,
    /// Diagnostic verbosity requested by the orchestrator.
    #[prost(int32, tag = "5")]
    pub verbosity: i32,
    /// Per-request sandbox directory; empty when the request is not sandboxed.
    #[prost(string, tag = "6")]
    pub sandbox_dir: String,
}

impl WorkRequest {
    /// Builds a plain work request with the given id and arguments.
    #[must_use]
    pub fn new(request_id: i32, arguments: Vec<String>) -> Self {
        Self {
            arguments,
            request_id,
            ..Self::default()
        }
    }

    /// Builds a cancellation message targeting `request_id`.
    #[must_use]
    pub fn cancellation(request_id: i32) -> Self {
        Self {
            request_id,
            cancel: true,
            ..Self::default()
        }
    }

    /// Attaches a sandbox directory to the request.
    #[must_use]
    pub fn with_sandbox_dir(mut self, sandbox_dir: impl Into<String>) -> Self {
        self.sandbox_dir = sandbox_dir.into();
        self
    }

    /// Returns `true` when the orchestrator supplied a sandbox directory.
    #[must_use]
    pub fn is_sandboxed(&self) -> bool {
        !self.sandbox_dir.is_empty()
    }
}

/// The result of one request, written to the worker's standard output.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkResponse {
    /// Exit code of the compiler, or `1` when the worker itself failed.
    #[prost(int32, tag = "1")]
    pub exit_code: i32,
    /// Combined compiler output or a worker diagnostic.
    #[prost(string, tag = "2")]
    pub output: String,
    /// Identifier of the request this response answers.
    #[prost(int32, tag = "3")]
    pub request_id: i32,
    /// Set when the request was terminated by a cancellation message.
    #[prost(bool, tag = "4")]
    pub was_cancelled: bool,
}

/// Exit code reported when the worker, rather than the compiler, failed.
pub const INTERNAL_FAILURE_EXIT_CODE: i32 = 1;

impl WorkResponse {
    /// Builds a response carrying a finished subprocess result.
    #[must_use]
    pub fn completed(request_id: i32, exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            request_id,
            was_cancelled: false,
        }
    }

    /// Builds a response describing a worker-side failure.
    #[must_use]
    pub fn failure(request_id: i32, diagnostic: impl Into<String>) -> Self {
        Self::completed(request_id, INTERNAL_FAILURE_EXIT_CODE, diagnostic)
    }

    /// Marks the response as answering a cancelled request.
    #[must_use]
    pub const fn cancelled(mut self) -> Self {
        self.was_cancelled = true;
        self
    }
}

/// Joins captured standard output and standard error into a response body.
///
/// Standard error is appended after a newline only when it is non-empty;
/// otherwise the result is exactly the standard output.
///
/// ```
/// use worker_protocol::compose_output;
///
/// assert_eq!(compose_output("built\n", ""), "built\n");
/// assert_eq!(compose_output("built", "warning"), "built\nwarning");
/// ```
#[must_use]
pub fn compose_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_owned();
    }
    let mut output = String::with_capacity(stdout.len() + stderr.len() + 1);
    output.push_str(stdout);
    output.push('\n');
    output.push_str(stderr);
    output
}
