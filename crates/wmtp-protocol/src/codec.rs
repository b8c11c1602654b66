//! Tokio codec for concatenated JSON messages

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::ProtocolError;
use crate::frame::{Boundary, FrameScanner, DEFAULT_MAX_FRAME_SIZE};
use crate::message::Response;

/// Codec that cuts a byte stream into top-level JSON segments
///
/// Decoding yields raw segments rather than parsed messages so that one bad
/// segment can be reported and dropped without ending the stream.
#[derive(Debug)]
pub struct JsonFrameCodec {
    scanner: FrameScanner,
    max_frame_size: usize,
}

impl JsonFrameCodec {
    /// Create a codec with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            scanner: FrameScanner::new(),
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Drop any partial segment state
    pub fn reset(&mut self) {
        self.scanner.reset();
    }
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.scanner.scan(src) {
                Boundary::Skip(n) => src.advance(n),
                Boundary::Segment { len } if len > self.max_frame_size => {
                    // Drop just this segment; anything after it still decodes
                    src.advance(len);
                    return Err(ProtocolError::FrameTooLarge {
                        size: len,
                        max: self.max_frame_size,
                    });
                }
                Boundary::Segment { len } => return Ok(Some(src.split_to(len).freeze())),
                Boundary::Incomplete => {
                    if src.len() > self.max_frame_size {
                        let size = src.len();
                        src.clear();
                        self.scanner.reset();
                        return Err(ProtocolError::FrameTooLarge {
                            size,
                            max: self.max_frame_size,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.scanner.remainder(src) {
            Some(len) => Ok(Some(src.split_to(len).freeze())),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonFrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }
        dst.reserve(payload.len());
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Buffer + codec + parser for the inbound half of the control stream
///
/// Each call returns one entry per segment found, in stream order: parsed
/// responses, or the error that made a segment unusable. Errors never stop
/// later segments from being returned.
#[derive(Debug, Default)]
pub struct InboundDecoder {
    codec: JsonFrameCodec,
    buffer: BytesMut,
}

impl InboundDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            codec: JsonFrameCodec::with_max_frame_size(max_frame_size),
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Bytes held back waiting for the rest of a segment
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk read from the stream and return what it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Response, ProtocolError>> {
        self.buffer.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Flush at end of stream; a trailing partial segment is reported as an error
    pub fn finish(&mut self) -> Vec<Result<Response, ProtocolError>> {
        self.drain(true)
    }

    fn drain(&mut self, eof: bool) -> Vec<Result<Response, ProtocolError>> {
        let mut out = Vec::new();
        loop {
            let next = if eof {
                self.codec.decode_eof(&mut self.buffer)
            } else {
                self.codec.decode(&mut self.buffer)
            };
            match next {
                Ok(Some(segment)) => out.push(Response::from_slice(&segment)),
                Ok(None) => break,
                Err(e) => {
                    // The codec has already dropped the offending bytes
                    debug!("Discarding inbound frame: {}", e);
                    out.push(Err(e));
                }
            }
        }
        out
    }
}
