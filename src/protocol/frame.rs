//! Frame type and outbound payload chunking.
//!
//! A frame is the unit actually written to the transport: one header plus
//! its body chunk. A logical payload larger than the maximum frame body is
//! split across several frames that share the same correlation id; only the
//! last frame sets `end = true`.

use bytes::Bytes;
use uuid::Uuid;

use super::wire_format::{Header, PayloadType, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body chunk (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Correlation id of the payload this frame belongs to.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.header.id
    }

    /// Payload kind.
    #[inline]
    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type
    }

    /// Whether this is the final frame of its payload.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.header.end
    }

    /// Total wire size of this frame (header + body).
    #[inline]
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encode header and body into one contiguous buffer.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Split a payload body into frames of at most `max_body` bytes each.
///
/// All frames carry `id` and `payload_type`; only the last sets `end`.
/// An empty body yields exactly one frame with `length = 0, end = true`,
/// so every payload is represented on the wire. A `max_body` of zero is
/// treated as 1 so the split always advances.
///
/// Chunks are sliced out of `body` without copying.
pub fn chunk_payload(
    id: Uuid,
    payload_type: PayloadType,
    body: Bytes,
    max_body: usize,
) -> Vec<Frame> {
    let max_body = max_body.max(1);

    if body.is_empty() {
        let header = Header::new(id, payload_type, 0, true);
        return vec![Frame::new(header, Bytes::new())];
    }

    let mut frames = Vec::with_capacity(body.len().div_ceil(max_body));
    let mut offset = 0;

    while offset < body.len() {
        let chunk_len = max_body.min(body.len() - offset);
        let chunk = body.slice(offset..offset + chunk_len);
        offset += chunk_len;

        let end = offset == body.len();
        let header = Header::new(id, payload_type, chunk_len as u32, end);
        frames.push(Frame::new(header, chunk));
    }

    frames
}
