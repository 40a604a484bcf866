//! Frame buffer for accumulating partial reads.
//!
//! The transport has no message boundaries, so the header's length field is
//! the only boundary signal. This state machine reads exactly one header,
//! then exactly that many body bytes, buffering whatever fragmentation the
//! transport produces:
//! - `WaitingForHeader`: need at least 22 bytes
//! - `WaitingForBody`: header parsed, need `length` more body bytes
//!
//! A partial frame left in the buffer when the connection dies is simply
//! dropped with the buffer; no partial data is ever handed upward.

use bytes::{Bytes, BytesMut};

use super::frame::Frame;
use super::wire_format::{Header, DEFAULT_FRAME_BODY_LIMIT, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting for its body bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Per-frame body length sanity bound.
    frame_body_limit: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default body length bound.
    pub fn new() -> Self {
        Self::with_frame_body_limit(DEFAULT_FRAME_BODY_LIMIT)
    }

    /// Create a new frame buffer with a custom per-frame body length bound.
    pub fn with_frame_body_limit(frame_body_limit: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            frame_body_limit,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the frames completed by this push (possibly none). Fragmented
    /// data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Framing`](crate::WireError::Framing) on a
    /// malformed header or a body length over the sanity bound. Framing
    /// errors are fatal: the session must be torn down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let Some(header) = Header::decode(&self.buffer)? else {
                    return Ok(None);
                };
                header.validate(self.frame_body_limit)?;

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.length == 0 {
                    return Ok(Some(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForBody { header };
                self.try_extract_one()
            }

            State::WaitingForBody { header } => {
                let needed = header.length as usize;
                if self.buffer.len() < needed {
                    return Ok(None);
                }

                let body = self.buffer.split_to(needed).freeze();
                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, body)))
            }
        }
    }

    /// Number of buffered bytes not yet consumed by a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no pending bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
