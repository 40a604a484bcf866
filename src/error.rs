//! Error types for duplexwire.

use thiserror::Error;

/// Main error type for all duplexwire operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error during transport operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt byte stream or malformed frame header.
    ///
    /// Always fatal to the current session: frame boundaries can no longer
    /// be trusted, so the connection is torn down.
    #[error("framing error: {0}")]
    Framing(String),

    /// Send attempted with no live transport attached.
    #[error("not connected")]
    NotConnected,

    /// A pending request was cancelled because the connection died.
    #[error("connection lost before a response arrived")]
    ConnectionLost,

    /// The remote request handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// MsgPack serialization error (payload bodies).
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (payload bodies).
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON error (content streams).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;
