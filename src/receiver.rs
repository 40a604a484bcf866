//! Payload receiver: owns the inbound half of a session.
//!
//! A dedicated read loop pulls bytes off the transport, extracts frames
//! through the [`FrameBuffer`] state machine, reassembles chunked payloads,
//! and forwards each completed payload to the dispatch channel. The loop
//! runs for the lifetime of one connection; when it ends (EOF, I/O error,
//! framing error, or explicit disconnect) all partial reassembly state dies
//! with it, so no partial payload ever survives into the next session.

use std::sync::Mutex;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::WireConfig;
use crate::protocol::{FrameBuffer, InboundPayload, PayloadAssembler};
use crate::transport::{DisconnectReason, TransportRead};

/// Read buffer size for each transport read call.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Continuously decodes frames from the transport and dispatches completed
/// payloads.
///
/// Reconnectable, symmetric to the sender: `connect` attaches a fresh
/// transport after a disconnect.
pub struct PayloadReceiver {
    read_task: Mutex<Option<JoinHandle<()>>>,
    frame_body_limit: u32,
    max_payload_size: usize,
}

impl PayloadReceiver {
    /// Create a detached receiver.
    pub fn new(config: &WireConfig) -> Self {
        Self {
            read_task: Mutex::new(None),
            frame_body_limit: config.frame_body_limit,
            max_payload_size: config.max_payload_size,
        }
    }

    /// Attach a transport read half and spawn the read loop.
    ///
    /// Completed payloads go to `inbound`; one disconnect notification goes
    /// to `disconnects` when the loop ends. A previously attached loop is
    /// aborted, discarding its partial reassembly buffers.
    pub fn connect(
        &self,
        read: TransportRead,
        inbound: mpsc::Sender<InboundPayload>,
        disconnects: mpsc::Sender<DisconnectReason>,
    ) {
        let task = tokio::spawn(read_loop(
            read,
            inbound,
            disconnects,
            self.frame_body_limit,
            self.max_payload_size,
        ));

        let mut slot = self
            .read_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Detach the transport, aborting the read loop.
    ///
    /// Partial reassembly buffers are discarded; a partial frame mid-read
    /// is never handed upward.
    pub fn disconnect(&self) {
        let task = self
            .read_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Whether a read loop is attached and still running.
    ///
    /// Returns `false` once the loop has exited on EOF, an I/O error, or a
    /// framing error, even before `disconnect` clears the slot.
    pub fn is_connected(&self) -> bool {
        self.read_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Read loop for one connection.
async fn read_loop(
    mut read: TransportRead,
    inbound: mpsc::Sender<InboundPayload>,
    disconnects: mpsc::Sender<DisconnectReason>,
    frame_body_limit: u32,
    max_payload_size: usize,
) {
    let mut frame_buffer = FrameBuffer::with_frame_body_limit(frame_body_limit);
    let mut assembler = PayloadAssembler::with_max_payload_size(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = 'outer: loop {
        let n = match read.read(&mut buf).await {
            Ok(0) => break DisconnectReason::Closed,
            Ok(n) => n,
            Err(e) => break DisconnectReason::Io(e.to_string()),
        };

        let frames = match frame_buffer.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!(error = %e, "corrupt frame stream, tearing down session");
                break DisconnectReason::Framing(e.to_string());
            }
        };

        for frame in frames {
            match assembler.push(frame) {
                Ok(Some(payload)) => {
                    if inbound.send(payload).await.is_err() {
                        // Dispatch side is gone; session is over.
                        break 'outer DisconnectReason::Local;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "payload reassembly failed, tearing down session");
                    break 'outer DisconnectReason::Framing(e.to_string());
                }
            }
        }
    };

    let _ = disconnects.try_send(reason);
}
