//! # duplexwire
//!
//! Duplex request/response sessions over ordered byte streams.
//!
//! The crate frames variable-length payloads onto any reliable byte
//! transport, correlates responses to requests by id, and survives
//! disconnects: pending callers are failed fast instead of hanging, and
//! the session reconnects with bounded backoff.
//!
//! ## Architecture
//!
//! - **Framing**: 22-byte binary header per frame, payloads chunked at
//!   4 KiB and reassembled by correlation id
//! - **Correlation**: every request gets a v4 UUID; the matching response
//!   resolves the caller's await, in any order
//! - **Transport**: pluggable behind [`transport::Connector`]; a named
//!   pipe pair (Unix domain sockets or Windows Named Pipes) and an
//!   in-process channel ship in-tree
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use duplexwire::{DuplexServer, DuplexClient, FnHandler, Request, Response};
//!
//! #[tokio::main]
//! async fn main() -> duplexwire::Result<()> {
//!     let handler = Arc::new(FnHandler::new(|_req: Request| async {
//!         Ok(Response::ok())
//!     }));
//!
//!     let server = DuplexServer::bind("/tmp/dialog-host", handler.clone())?;
//!     let client = DuplexClient::connect("/tmp/dialog-host", handler);
//!     tokio::try_join!(server.start(), client.start())?;
//!
//!     let response = client.send_request(Request::get("/ping")).await?;
//!     assert_eq!(response.status_code, 200);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod payload;
pub mod protocol;
pub mod transport;

mod adapter;
mod manager;
mod receiver;
mod sender;
mod session;

pub use adapter::ProtocolAdapter;
pub use config::{ReconnectPolicy, WireConfig};
pub use error::{Result, WireError};
pub use handler::{FnHandler, RequestHandler};
pub use manager::RequestManager;
pub use payload::{ContentStream, ReceiveResponse, Request, Response};
pub use receiver::PayloadReceiver;
pub use sender::PayloadSender;
pub use session::{ConnectionState, DuplexClient, DuplexEndpoint, DuplexServer, EndpointBuilder};
