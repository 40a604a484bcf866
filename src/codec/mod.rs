//! Body codecs for payload serialization.
//!
//! Frame bodies are opaque bytes to the framing layer; Request and Response
//! payloads are encoded with MessagePack above it.

mod msgpack;

pub use msgpack::MsgPackCodec;
