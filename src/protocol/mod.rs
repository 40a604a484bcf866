//! Protocol module - wire format, framing, and payload reassembly.
//!
//! This module implements the binary framing layer:
//! - 22-byte header encoding/decoding
//! - Outbound payload chunking into frames
//! - Frame buffer for accumulating partial reads
//! - Reassembly of chunked payloads keyed by correlation id

mod assembler;
mod frame;
mod frame_buffer;
mod wire_format;

pub use assembler::{InboundPayload, PayloadAssembler};
pub use frame::{chunk_payload, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    Header, PayloadType, DEFAULT_FRAME_BODY_LIMIT, DEFAULT_MAX_FRAME_BODY,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
