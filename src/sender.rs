//! Payload sender: owns the outbound half of a session.
//!
//! Frames are written by a dedicated writer task fed through an mpsc
//! channel, so concurrent `send_payload` callers never contend on a lock
//! around the transport. Each channel message carries ALL frames of one
//! payload, which is what guarantees the wire-ordering invariant: one
//! payload's frames are fully written before the next payload's frames
//! begin, and the remote side never has to interleave-decode two bodies.
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundPayload> ─► Writer Task ─► Transport
//! Caller N ─┘
//! ```

use std::sync::Mutex;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::WireConfig;
use crate::error::{Result, WireError};
use crate::protocol::{chunk_payload, Frame, PayloadType};
use crate::transport::{DisconnectReason, TransportWrite};

/// All frames of one logical payload, queued as a unit.
#[derive(Debug)]
pub(crate) struct OutboundPayload {
    frames: Vec<Frame>,
}

/// Live connection state of the sender.
struct Attached {
    tx: mpsc::Sender<OutboundPayload>,
}

/// Serializes outgoing payloads into frames and writes them to the
/// transport.
///
/// Reconnectable: `connect` attaches a fresh transport after a disconnect.
/// While detached, `send_payload` fails with
/// [`NotConnected`](WireError::NotConnected).
pub struct PayloadSender {
    attached: Mutex<Option<Attached>>,
    max_frame_body: usize,
    channel_capacity: usize,
}

impl PayloadSender {
    /// Create a detached sender.
    pub fn new(config: &WireConfig) -> Self {
        Self {
            attached: Mutex::new(None),
            max_frame_body: config.max_frame_body,
            channel_capacity: config.channel_capacity,
        }
    }

    /// Attach a transport write half and spawn the writer task.
    ///
    /// `disconnects` receives one notification when the transport fails or
    /// the sender is detached. Any previously attached transport is
    /// replaced; its writer task drains and exits.
    pub fn connect(&self, write: TransportWrite, disconnects: mpsc::Sender<DisconnectReason>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(write_loop(rx, write, disconnects));

        let mut attached = self
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *attached = Some(Attached { tx });
    }

    /// Detach the transport.
    ///
    /// Queued payloads are still flushed by the writer task before it
    /// exits and emits its disconnect notification.
    pub fn disconnect(&self) {
        let mut attached = self
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *attached = None;
    }

    /// Whether a transport is attached and its writer task still alive.
    ///
    /// Returns `false` once the writer has exited on a write failure, even
    /// before `disconnect` clears the slot.
    pub fn is_connected(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|a| !a.tx.is_closed())
    }

    /// Chunk `body` into frames and queue them for writing.
    ///
    /// # Errors
    ///
    /// [`NotConnected`](WireError::NotConnected) if no transport is
    /// attached or the writer task already exited on a transport failure.
    pub async fn send_payload(
        &self,
        id: Uuid,
        payload_type: PayloadType,
        body: Bytes,
    ) -> Result<()> {
        let tx = {
            let attached = self
                .attached
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match attached.as_ref() {
                Some(a) => a.tx.clone(),
                None => return Err(WireError::NotConnected),
            }
        };

        let frames = chunk_payload(id, payload_type, body, self.max_frame_body);
        tx.send(OutboundPayload { frames })
            .await
            .map_err(|_| WireError::NotConnected)
    }
}

/// Writer task: drains the payload queue onto the transport.
///
/// Exits when the channel closes (detach) or a write fails; either way it
/// emits exactly one disconnect notification.
async fn write_loop(
    mut rx: mpsc::Receiver<OutboundPayload>,
    mut write: TransportWrite,
    disconnects: mpsc::Sender<DisconnectReason>,
) {
    let reason = loop {
        let Some(payload) = rx.recv().await else {
            break DisconnectReason::Local;
        };

        if let Err(e) = write_payload(&mut write, &payload).await {
            tracing::debug!(error = %e, "transport write failed");
            break DisconnectReason::Io(e.to_string());
        }
    };

    // The supervisor may already be tearing down; a full or closed channel
    // just means the notification is redundant.
    let _ = disconnects.try_send(reason);
}

/// Write every frame of one payload, then flush once.
async fn write_payload(write: &mut TransportWrite, payload: &OutboundPayload) -> std::io::Result<()> {
    for frame in &payload.frames {
        write.write_all(&frame.header.encode()).await?;
        if !frame.body.is_empty() {
            write.write_all(&frame.body).await?;
        }
    }
    write.flush().await
}
