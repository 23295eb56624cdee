//! Frame codec for the worker's standard I/O streams.
//!
//! A frame is one complete protocol message. The reader side decodes
//! [`WorkRequest`] frames from standard input and reports a clean end of
//! stream as `Ok(None)`; the writer side encodes each [`WorkResponse`] into a
//! buffer and emits it with a single `write_all` so a frame is never split
//! across calls.

mod json;
mod proto;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ProtocolError;
use crate::messages::{WorkRequest, WorkResponse};

pub use self::json::{JsonFrameReader, JsonFrameWriter};
pub use self::proto::{MAX_FRAME_BYTES, ProtoFrameReader, ProtoFrameWriter};

/// Decodes work requests from an input stream.
pub trait FrameReader {
    /// Reads the next request.
    ///
    /// Returns `Ok(None)` when the stream closed on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the stream fails or a frame is
    /// malformed or truncated.
    fn read_request(&mut self) -> Result<Option<WorkRequest>, ProtocolError>;
}

/// Encodes work responses onto an output stream.
pub trait FrameWriter {
    /// Writes one response as a single frame and flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when encoding or writing fails.
    fn write_response(&mut self, response: &WorkResponse) -> Result<(), ProtocolError>;
}

/// Wire formats understood by the worker.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WireFormat {
    /// Varint length-delimited protobuf messages.
    #[default]
    Proto,
    /// Whitespace-separated JSON objects.
    Json,
}

/// Errors encountered while parsing a [`WireFormat`] from text.
pub type WireFormatParseError = strum::ParseError;

impl WireFormat {
    /// Builds a request reader for this format over `input`.
    #[must_use]
    pub fn reader<R>(self, input: R) -> Box<dyn FrameReader + Send>
    where
        R: Read + Send + 'static,
    {
        match self {
            Self::Proto => Box::new(ProtoFrameReader::new(input)),
            Self::Json => Box::new(JsonFrameReader::<R, WorkRequest>::new(input)),
        }
    }

    /// Builds a response writer for this format over `output`.
    #[must_use]
    pub fn writer<W>(self, output: W) -> Box<dyn FrameWriter + Send>
    where
        W: Write + Send + 'static,
    {
        match self {
            Self::Proto => Box::new(ProtoFrameWriter::new(output)),
            Self::Json => Box::new(JsonFrameWriter::new(output)),
        }
    }

    /// Encodes a request the way the orchestrator would send it.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the request cannot be serialised.
    pub fn encode_request(self, request: &WorkRequest) -> Result<Vec<u8>, ProtocolError> {
        let mut buffer = Vec::new();
        match self {
            Self::Proto => ProtoFrameWriter::new(&mut buffer).write_message(request)?,
            Self::Json => JsonFrameWriter::new(&mut buffer).write_message(request)?,
        }
        Ok(buffer)
    }

    /// Decodes every response frame in `bytes`, as the orchestrator would.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when any frame is malformed or truncated.
    pub fn decode_responses(self, bytes: &[u8]) -> Result<Vec<WorkResponse>, ProtocolError> {
        let mut responses = Vec::new();
        match self {
            Self::Proto => {
                let mut reader = ProtoFrameReader::new(bytes);
                while let Some(response) = reader.read_message::<WorkResponse>()? {
                    responses.push(response);
                }
            }
            Self::Json => {
                let mut reader = JsonFrameReader::<_, WorkResponse>::new(bytes);
                while let Some(response) = reader.read_message()? {
                    responses.push(response);
                }
            }
        }
        Ok(responses)
    }
}
