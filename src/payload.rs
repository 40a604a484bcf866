//! Application payload types: Request, Response, and content streams.
//!
//! These are what callers exchange through the protocol; the framing layer
//! below only ever sees their encoded bytes. Each Request or Response
//! carries an ordered sequence of named content streams, each of which is a
//! byte sequence (optionally JSON-encoded).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A named byte stream attached to a Request or Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStream {
    /// Stream name, unique within its payload by convention.
    pub name: String,
    /// Stream content.
    pub content: Bytes,
}

impl ContentStream {
    /// Create a stream from raw bytes.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a stream whose content is a JSON-encoded value.
    pub fn json<T: Serialize>(name: impl Into<String>, value: &T) -> Result<Self> {
        let content = serde_json::to_vec(value)?;
        Ok(Self {
            name: name.into(),
            content: Bytes::from(content),
        })
    }

    /// Decode the content as JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

/// An action the sending side wants the receiving side to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Action verb, e.g. `"GET"` or `"POST"`.
    pub verb: String,
    /// Resource path the verb applies to.
    pub path: String,
    /// Ordered content streams attached to this request.
    pub streams: Vec<ContentStream>,
}

impl Request {
    /// Create a request with no streams.
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Shorthand for a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Append a content stream, preserving order.
    pub fn add_stream(mut self, stream: ContentStream) -> Self {
        self.streams.push(stream);
        self
    }
}

/// The result of processing a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Ordered content streams attached to this response.
    pub streams: Vec<ContentStream>,
}

impl Response {
    /// Create a response with the given status and no streams.
    pub fn with_status(status_code: u16) -> Self {
        Self {
            status_code,
            streams: Vec::new(),
        }
    }

    /// A 200 response with no streams.
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    /// An error response carrying the message as a JSON stream named
    /// `"error"`.
    pub fn error(status_code: u16, message: &str) -> Self {
        let mut response = Self::with_status(status_code);
        // Serializing a &str to JSON cannot fail.
        if let Ok(stream) = ContentStream::json("error", &message) {
            response.streams.push(stream);
        }
        response
    }

    /// Append a content stream, preserving order.
    pub fn add_stream(mut self, stream: ContentStream) -> Self {
        self.streams.push(stream);
        self
    }
}

/// The caller-visible result of a resolved `send_request`.
///
/// Wraps the [`Response`] the remote side produced for the correlated id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveResponse {
    /// HTTP-style status code from the remote handler.
    pub status_code: u16,
    /// Content streams from the remote handler, in order.
    pub streams: Vec<ContentStream>,
}

impl From<Response> for ReceiveResponse {
    fn from(response: Response) -> Self {
        Self {
            status_code: response.status_code,
            streams: response.streams,
        }
    }
}
