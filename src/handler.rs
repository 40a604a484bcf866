//! Request handler boundary.
//!
//! The hosting application supplies a [`RequestHandler`] to process inbound
//! requests; the protocol adapter invokes it and sends its result back as a
//! Response tagged with the request's correlation id. Handler failures are
//! converted to error-status Responses by the adapter, never propagated into
//! the transport layer.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::payload::{Request, Response};

/// Boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Processes one inbound [`Request`] into a [`Response`].
///
/// Implementations may be called concurrently from many handler tasks.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request.
    ///
    /// Returning `Err` is safe: the adapter converts it to a status-500
    /// Response carrying the error message.
    fn handle(&self, request: Request) -> BoxFuture<'static, Result<Response>>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
///
/// # Example
///
/// ```
/// use duplexwire::handler::FnHandler;
/// use duplexwire::payload::{Request, Response};
///
/// let handler = FnHandler::new(|request: Request| async move {
///     match request.verb.as_str() {
///         "GET" => Ok(Response::ok()),
///         _ => Ok(Response::with_status(405)),
///     }
/// });
/// ```
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    /// Wrap an async closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn handle(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        Box::pin((self.func)(request))
    }
}
