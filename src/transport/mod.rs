//! Transport boundary: how a duplex session obtains its byte streams.
//!
//! The protocol core only needs an ordered, reliable byte stream in each
//! direction. A [`Connector`] produces one such pair per session attempt;
//! concrete implementations (named pipe pair, socket, in-process queue) are
//! swappable behind it.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::handler::BoxFuture;

pub mod memory;
pub mod pipe;

/// Inbound half of a duplex session.
pub type TransportRead = Box<dyn AsyncRead + Send + Unpin>;

/// Outbound half of a duplex session.
pub type TransportWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Both physical half-channels of one duplex session.
///
/// A session is only considered connected once both halves are live; a
/// connector must not return until that is true.
pub struct DuplexPair {
    /// Bytes flowing from the remote peer to us.
    pub read: TransportRead,
    /// Bytes flowing from us to the remote peer.
    pub write: TransportWrite,
}

impl DuplexPair {
    /// Build a pair from any owned read/write halves.
    pub fn new(
        read: impl AsyncRead + Send + Unpin + 'static,
        write: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            write: Box::new(write),
        }
    }

    /// Build a pair by splitting a single bidirectional stream.
    pub fn from_stream(
        stream: impl AsyncRead + AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self::new(read, write)
    }
}

/// Establishes the two physical half-channels of a duplex session.
///
/// Called once per connection attempt; the reconnect policy calls it again
/// after a disconnect. The server variant accepts connections, the client
/// variant initiates them.
pub trait Connector: Send + Sync + 'static {
    /// Open both halves of a fresh session.
    fn open(&self) -> BoxFuture<'_, Result<DuplexPair>>;
}

/// Why a connected session ended.
///
/// Carried by the one-shot disconnect notification the sender and receiver
/// emit toward the session supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote peer closed the stream (EOF).
    Closed,
    /// An I/O error on the underlying channel.
    Io(String),
    /// The byte stream was corrupt; frame boundaries are untrustworthy.
    Framing(String),
    /// This side disconnected deliberately.
    Local,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "remote closed the connection"),
            DisconnectReason::Io(e) => write!(f, "transport error: {e}"),
            DisconnectReason::Framing(e) => write!(f, "framing error: {e}"),
            DisconnectReason::Local => write!(f, "local disconnect"),
        }
    }
}
