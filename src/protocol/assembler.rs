//! Payload reassembly from frame chunks.
//!
//! Collects body chunks keyed by correlation id until the `end` frame
//! arrives, then yields the complete payload. An entry leaves the buffer the
//! instant its payload completes; partial entries die with the assembler
//! when the connection disconnects, so a payload from a previous session is
//! never resurrected after reconnect.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::frame::Frame;
use super::wire_format::{PayloadType, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::error::{Result, WireError};

/// A fully reassembled logical payload.
#[derive(Debug, Clone)]
pub struct InboundPayload {
    /// Correlation id.
    pub id: Uuid,
    /// Payload kind.
    pub payload_type: PayloadType,
    /// Complete body, exactly the bytes the sender chunked.
    pub body: Bytes,
}

/// In-progress reassembly for one payload id.
struct PartialPayload {
    payload_type: PayloadType,
    body: BytesMut,
}

/// Reassembles chunked payloads from a stream of frames.
pub struct PayloadAssembler {
    partials: HashMap<Uuid, PartialPayload>,
    /// Cap on a fully reassembled payload.
    max_payload_size: usize,
}

impl PayloadAssembler {
    /// Create an assembler with the default payload size cap.
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create an assembler with a custom payload size cap.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            partials: HashMap::new(),
            max_payload_size,
        }
    }

    /// Feed one frame; returns the completed payload if this was its final
    /// chunk.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Framing`] if the accumulated payload exceeds the
    /// size cap or if chunks for the same id disagree on payload type.
    /// Framing errors are fatal to the session.
    pub fn push(&mut self, frame: Frame) -> Result<Option<InboundPayload>> {
        let id = frame.id();
        let end = frame.is_end();

        // Fast path: single-frame payload with no partial state. The size
        // cap applies here too; the frame body limit does not imply it.
        if end && !self.partials.contains_key(&id) {
            if frame.body.len() > self.max_payload_size {
                return Err(WireError::Framing(format!(
                    "payload {id} exceeds maximum size {}",
                    self.max_payload_size
                )));
            }
            return Ok(Some(InboundPayload {
                id,
                payload_type: frame.payload_type(),
                body: frame.body,
            }));
        }

        let partial = self.partials.entry(id).or_insert_with(|| PartialPayload {
            payload_type: frame.header.payload_type,
            body: BytesMut::new(),
        });

        if partial.payload_type != frame.header.payload_type {
            self.partials.remove(&id);
            return Err(WireError::Framing(format!(
                "payload {id} changed type mid-stream"
            )));
        }

        if partial.body.len() + frame.body.len() > self.max_payload_size {
            self.partials.remove(&id);
            return Err(WireError::Framing(format!(
                "payload {id} exceeds maximum size {}",
                self.max_payload_size
            )));
        }

        partial.body.extend_from_slice(&frame.body);

        if !end {
            return Ok(None);
        }

        let partial = self
            .partials
            .remove(&id)
            .unwrap_or_else(|| unreachable!("entry inserted above"));

        Ok(Some(InboundPayload {
            id,
            payload_type: partial.payload_type,
            body: partial.body.freeze(),
        }))
    }

    /// Number of payloads currently mid-reassembly.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }
}

impl Default for PayloadAssembler {
    fn default() -> Self {
        Self::new()
    }
}
