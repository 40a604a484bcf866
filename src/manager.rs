//! Request manager: correlates outbound requests with their responses.
//!
//! The registry is the single synchronized resource shared between the send
//! path and the receive path. Every mutation takes the one lock, so a
//! resolve can never race a cancel into completing the same handle twice,
//! and nothing awaits while holding it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, WireError};
use crate::payload::ReceiveResponse;

type PendingSender = oneshot::Sender<Result<ReceiveResponse>>;

/// Registry of outstanding outbound requests keyed by correlation id.
///
/// Each id is removed exactly once: on response arrival, on caller
/// abandonment, or in the mass cancellation at disconnect. Late or
/// duplicate resolutions are silent no-ops.
pub struct RequestManager {
    pending: Mutex<HashMap<Uuid, PendingSender>>,
}

impl RequestManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fresh request id and return the handle its response will
    /// resolve.
    ///
    /// Ids are v4 UUIDs, so collisions are negligible; if one ever occurs
    /// the older handle is dropped (its caller sees `ConnectionLost`) and a
    /// warning is logged.
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<Result<ReceiveResponse>> {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, tx);
        if previous.is_some() {
            tracing::warn!(%id, "duplicate request id registered, dropping older handle");
        }
        rx
    }

    /// Complete the handle for `id` if it is still registered.
    ///
    /// Returns `false` (a no-op, not an error) if the id was already
    /// resolved, abandoned, or cancelled: a late or duplicate response must
    /// never crash the sender.
    pub fn resolve(&self, id: Uuid, result: Result<ReceiveResponse>) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        match sender {
            // send fails only if the caller already went away; still a no-op.
            Some(tx) => tx.send(result).is_ok(),
            None => {
                tracing::debug!(%id, "response for unknown or already-settled id, dropping");
                false
            }
        }
    }

    /// Remove a pending id without completing it (caller cancelled or the
    /// send failed before the request hit the wire).
    pub fn abandon(&self, id: Uuid) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Complete every still-pending handle with `ConnectionLost`.
    ///
    /// Called at disconnect so no caller blocks forever. Returns how many
    /// handles were cancelled. Safe to call concurrently with in-flight
    /// register/resolve calls and safe to call more than once (the second
    /// pass finds an empty registry).
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingSender> = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.drain().map(|(_, tx)| tx).collect()
        };

        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(WireError::ConnectionLost));
        }
        count
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}
