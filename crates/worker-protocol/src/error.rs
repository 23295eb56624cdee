//! Errors raised while framing protocol messages.
//!
//! Every variant is fatal to the worker: once a frame has been misread the
//! stream position can no longer be trusted.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from reading or writing framed messages.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The underlying stream failed.
    #[error("I/O error on worker stream: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The stream ended part-way through a frame.
    #[error("stream ended inside a frame after {read} of {expected} bytes")]
    Truncated {
        /// Bytes received before the stream closed.
        read: usize,
        /// Bytes the frame header promised.
        expected: usize,
    },

    /// The length prefix was not a valid varint.
    #[error("malformed frame length prefix")]
    MalformedLength,

    /// The length prefix announced a frame larger than the accepted maximum.
    #[error("frame of {size} bytes exceeds {max_size} byte limit")]
    FrameTooLarge {
        /// Announced frame size.
        size: u64,
        /// Maximum accepted frame size.
        max_size: usize,
    },

    /// The frame body could not be decoded as a protobuf message.
    #[error("failed to decode protobuf frame: {source}")]
    Decode {
        /// Underlying decoder error.
        #[source]
        source: prost::DecodeError,
    },

    /// The frame body could not be decoded as a JSON message.
    #[error("failed to decode JSON frame: {message}")]
    DecodeJson {
        /// Human-readable description of the parse failure.
        message: String,
    },

    /// A response could not be serialised as JSON.
    #[error("failed to serialise JSON response: {message}")]
    EncodeJson {
        /// Human-readable description of the serialisation failure.
        message: String,
    },
}

impl From<io::Error> for ProtocolError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}
