//! Varint length-delimited protobuf framing.

use std::io::{self, Read, Write};

use prost::Message;

use super::{FrameReader, FrameWriter};
use crate::error::ProtocolError;
use crate::messages::{WorkRequest, WorkResponse};

/// Largest frame body accepted from the orchestrator.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A `u64` varint never needs more than ten bytes.
const MAX_VARINT_BYTES: usize = 10;

/// Reads varint length-prefixed protobuf messages.
#[derive(Debug)]
pub struct ProtoFrameReader<R> {
    reader: R,
}

impl<R: Read> ProtoFrameReader<R> {
    /// Wraps an input stream.
    #[must_use]
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next message of type `M`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the prefix or body is malformed,
    /// truncated or oversized, or when the stream fails.
    pub fn read_message<M>(&mut self) -> Result<Option<M>, ProtocolError>
    where
        M: Message + Default,
    {
        let Some(length) = self.read_length()? else {
            return Ok(None);
        };

        let mut body = Vec::with_capacity(length);
        let limit = u64::try_from(length).map_err(|_| ProtocolError::MalformedLength)?;
        let read = (&mut self.reader).take(limit).read_to_end(&mut body)?;
        if read < length {
            return Err(ProtocolError::Truncated {
                read,
                expected: length,
            });
        }

        M::decode(body.as_slice())
            .map(Some)
            .map_err(|source| ProtocolError::Decode { source })
    }

    fn read_length(&mut self) -> Result<Option<usize>, ProtocolError> {
        let mut value = 0_u64;
        for index in 0..MAX_VARINT_BYTES {
            let Some(byte) = self.read_byte()? else {
                if index == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::Truncated {
                    read: index,
                    expected: index + 1,
                });
            };
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return checked_length(value).map(Some);
            }
        }
        Err(ProtocolError::MalformedLength)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ProtocolError> {
        let mut byte = [0_u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }
    }
}

fn checked_length(value: u64) -> Result<usize, ProtocolError> {
    match usize::try_from(value) {
        Ok(length) if length <= MAX_FRAME_BYTES => Ok(length),
        _ => Err(ProtocolError::FrameTooLarge {
            size: value,
            max_size: MAX_FRAME_BYTES,
        }),
    }
}

impl<R: Read> FrameReader for ProtoFrameReader<R> {
    fn read_request(&mut self) -> Result<Option<WorkRequest>, ProtocolError> {
        self.read_message()
    }
}

/// Writes varint length-prefixed protobuf messages.
#[derive(Debug)]
pub struct ProtoFrameWriter<W> {
    writer: W,
}

impl<W: Write> ProtoFrameWriter<W> {
    /// Wraps an output stream.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one length-prefixed message with a single `write_all`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when writing or flushing fails.
    pub fn write_message<M: Message>(&mut self, message: &M) -> Result<(), ProtocolError> {
        let frame = message.encode_length_delimited_to_vec();
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> FrameWriter for ProtoFrameWriter<W> {
    fn write_response(&mut self, response: &WorkResponse) -> Result<(), ProtocolError> {
        self.write_message(response)
    }
}
