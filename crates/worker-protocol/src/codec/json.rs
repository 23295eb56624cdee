//! JSON framing: one object per message, separated by whitespace.

use std::io::{Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer};

use super::{FrameReader, FrameWriter};
use crate::error::ProtocolError;
use crate::messages::{WorkRequest, WorkResponse};

/// Reads a stream of JSON objects.
pub struct JsonFrameReader<R, M>
where
    R: Read,
    M: DeserializeOwned,
{
    stream: StreamDeserializer<'static, IoRead<R>, M>,
}

impl<R, M> JsonFrameReader<R, M>
where
    R: Read,
    M: DeserializeOwned,
{
    /// Wraps an input stream.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            stream: Deserializer::from_reader(reader).into_iter::<M>(),
        }
    }

    /// Reads the next object, returning `Ok(None)` once only whitespace remains.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DecodeJson`] when the next object is malformed
    /// or the stream ends inside it.
    pub fn read_message(&mut self) -> Result<Option<M>, ProtocolError> {
        match self.stream.next() {
            None => Ok(None),
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(error)) => Err(ProtocolError::DecodeJson {
                message: error.to_string(),
            }),
        }
    }
}

impl<R: Read> FrameReader for JsonFrameReader<R, WorkRequest> {
    fn read_request(&mut self) -> Result<Option<WorkRequest>, ProtocolError> {
        self.read_message()
    }
}

/// Writes JSON objects, one per line.
#[derive(Debug)]
pub struct JsonFrameWriter<W> {
    writer: W,
}

impl<W: Write> JsonFrameWriter<W> {
    /// Wraps an output stream.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one newline-terminated object with a single `write_all`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when serialisation, writing or flushing
    /// fails.
    pub fn write_message<M: Serialize>(&mut self, message: &M) -> Result<(), ProtocolError> {
        let mut frame = serde_json::to_vec(message).map_err(|error| ProtocolError::EncodeJson {
            message: error.to_string(),
        })?;
        frame.push(b'\n');
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> FrameWriter for JsonFrameWriter<W> {
    fn write_response(&mut self, response: &WorkResponse) -> Result<(), ProtocolError> {
        self.write_message(response)
    }
}
