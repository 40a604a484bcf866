//! Wire format encoding and decoding.
//!
//! Implements the 22-byte frame header:
//!
//! ```text
//! ┌───────────┬─────────┬───────────┬────────┐
//! │ id        │ type    │ length    │ end    │
//! │ 16 bytes  │ 1 byte  │ 4 bytes   │ 1 byte │
//! │ UUID      │ enum    │ uint32 BE │ bool   │
//! └───────────┴─────────┴───────────┴────────┘
//! ```
//!
//! `id` correlates all frames of one logical payload. `length` is the body
//! length of this frame only; `end = false` means more frames for the same
//! `id` follow. Multi-byte integers are Big Endian.

use uuid::Uuid;

use crate::error::{Result, WireError};

/// Header size in bytes (fixed, exactly 22).
pub const HEADER_SIZE: usize = 22;

/// Default maximum frame body size used when chunking outbound payloads.
pub const DEFAULT_MAX_FRAME_BODY: usize = 4096;

/// Default per-frame body length bound accepted from the wire (1 MiB).
///
/// A header claiming more than this is treated as corrupt rather than as a
/// request to allocate.
pub const DEFAULT_FRAME_BODY_LIMIT: u32 = 1024 * 1024;

/// Default cap on a fully reassembled payload (1 GiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1_073_741_824;

/// Logical payload kind carried in the header's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// An action the sending side wants the receiving side to perform.
    Request = 0x01,
    /// The result of processing a Request, correlated by id.
    Response = 0x02,
    /// A standalone stream body (large attachment).
    Stream = 0x03,
}

impl PayloadType {
    /// Decode a type byte. Unknown values are a framing error.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(PayloadType::Request),
            0x02 => Ok(PayloadType::Response),
            0x03 => Ok(PayloadType::Stream),
            other => Err(WireError::Framing(format!(
                "unknown payload type byte 0x{other:02X}"
            ))),
        }
    }

    /// Encode to the wire byte.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Correlation id shared by all frames of one logical payload.
    pub id: Uuid,
    /// Payload kind.
    pub payload_type: PayloadType,
    /// Body length of this frame, in bytes.
    pub length: u32,
    /// True on the final frame of the payload.
    pub end: bool,
}

impl Header {
    /// Create a new header.
    pub fn new(id: Uuid, payload_type: PayloadType, length: u32, end: bool) -> Self {
        Self {
            id,
            payload_type,
            length,
            end,
        }
    }

    /// Encode the header to its 22-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_SIZE`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..16].copy_from_slice(self.id.as_bytes());
        buf[16] = self.payload_type.as_byte();
        buf[17..21].copy_from_slice(&self.length.to_be_bytes());
        buf[21] = u8::from(self.end);
    }

    /// Decode a header from bytes.
    ///
    /// Returns `Ok(None)` if the buffer holds fewer than [`HEADER_SIZE`]
    /// bytes. An unknown type byte or a non-boolean end byte is a
    /// [`WireError::Framing`].
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&buf[0..16]);

        let payload_type = PayloadType::from_byte(buf[16])?;
        let length = u32::from_be_bytes([buf[17], buf[18], buf[19], buf[20]]);
        let end = match buf[21] {
            0x00 => false,
            0x01 => true,
            other => {
                return Err(WireError::Framing(format!(
                    "invalid end byte 0x{other:02X}"
                )))
            }
        };

        Ok(Some(Self {
            id: Uuid::from_bytes(id_bytes),
            payload_type,
            length,
            end,
        }))
    }

    /// Validate the header against the per-frame body sanity bound.
    pub fn validate(&self, frame_body_limit: u32) -> Result<()> {
        if self.length > frame_body_limit {
            return Err(WireError::Framing(format!(
                "frame body length {} exceeds limit {}",
                self.length, frame_body_limit
            )));
        }
        Ok(())
    }
}
