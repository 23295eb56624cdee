//! Wire types and framing for the persistent worker protocol.
//!
//! The build orchestrator talks to a persistent worker over the worker's
//! standard streams: framed [`WorkRequest`] messages arrive on standard input
//! and framed [`WorkResponse`] messages leave on standard output. This crate
//! owns the message schema and the [`codec`] that reads and writes frames in
//! either of the two wire formats the orchestrator supports.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//!
//! use worker_protocol::{WireFormat, WorkRequest};
//!
//! let bytes = WireFormat::Proto
//!     .encode_request(&WorkRequest::new(1, vec!["a.cs".into()]))
//!     .expect("encode request");
//! let mut reader = WireFormat::Proto.reader(Cursor::new(bytes));
//! let request = reader.read_request().expect("read").expect("one request");
//! assert_eq!(request.arguments, vec![String::from("a.cs")]);
//! assert!(reader.read_request().expect("read").is_none());
//! ```

pub mod codec;
pub mod error;
pub mod messages;

pub use self::codec::{FrameReader, FrameWriter, WireFormat, WireFormatParseError};
pub use self::error::ProtocolError;
pub use self::messages::{
    INTERNAL_FAILURE_EXIT_CODE, Input, WorkRequest, WorkResponse, compose_output,
};
