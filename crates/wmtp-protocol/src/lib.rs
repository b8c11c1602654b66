//! wmtp-protocol: Wire vocabulary and framing for the WMTP client
//!
//! WMTP messages are single JSON objects written back to back on one
//! bidirectional WebTransport stream, with no delimiter between them.
//! This crate knows how to build requests, read responses, and find the
//! object boundaries in a byte stream. It performs no I/O.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{InboundDecoder, JsonFrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameScanner, DEFAULT_MAX_FRAME_SIZE};
pub use message::{cmd, codes, ErrorCode, Request, Response, Status};
