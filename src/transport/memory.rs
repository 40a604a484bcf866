//! In-process transport over `tokio::io::duplex`.
//!
//! Useful for tests and for wiring two components of one process through
//! the full protocol stack without touching the OS. A [`SessionQueue`]
//! feeds successive sessions to its [`MemoryConnector`], which lets tests
//! drive reconnect cycles deterministically.

use tokio::sync::{mpsc, Mutex};

use super::{Connector, DuplexPair};
use crate::error::{Result, WireError};
use crate::handler::BoxFuture;

/// Create two pre-wired duplex pairs, one per endpoint, sharing a single
/// in-memory link of the given buffer capacity.
pub fn link(capacity: usize) -> (DuplexPair, DuplexPair) {
    let (a, b) = tokio::io::duplex(capacity);
    (DuplexPair::from_stream(a), DuplexPair::from_stream(b))
}

/// Producer side: offers sessions to a [`MemoryConnector`].
#[derive(Clone)]
pub struct SessionQueue {
    tx: mpsc::UnboundedSender<DuplexPair>,
}

impl SessionQueue {
    /// Offer the next session's half-channels to the connector.
    ///
    /// Returns `false` if the connector was dropped.
    pub fn offer(&self, pair: DuplexPair) -> bool {
        self.tx.send(pair).is_ok()
    }
}

/// A [`Connector`] that hands out sessions from its queue, awaiting the
/// next offer when the queue is empty.
pub struct MemoryConnector {
    sessions: Mutex<mpsc::UnboundedReceiver<DuplexPair>>,
}

impl MemoryConnector {
    /// Create a connector together with the queue that feeds it.
    pub fn queue() -> (SessionQueue, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionQueue { tx },
            MemoryConnector {
                sessions: Mutex::new(rx),
            },
        )
    }

    /// Two connectors joined by a single in-memory link.
    ///
    /// Each side yields exactly one session; a reconnect attempt on either
    /// side fails with `NotConnected`.
    pub fn pair(capacity: usize) -> (MemoryConnector, MemoryConnector) {
        let (queue_a, connector_a) = Self::queue();
        let (queue_b, connector_b) = Self::queue();

        let (pair_a, pair_b) = link(capacity);
        queue_a.offer(pair_a);
        queue_b.offer(pair_b);

        (connector_a, connector_b)
    }
}

impl Connector for MemoryConnector {
    fn open(&self) -> BoxFuture<'_, Result<DuplexPair>> {
        Box::pin(async move {
            let mut sessions = self.sessions.lock().await;
            sessions.recv().await.ok_or(WireError::NotConnected)
        })
    }
}
