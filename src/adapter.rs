//! Protocol adapter: the façade between callers and the payload layer.
//!
//! Outbound: `send_request` generates a fresh correlation id, registers it
//! with the request manager, hands the encoded Request to the payload
//! sender, and suspends the caller until the matching Response arrives or
//! the connection is declared dead.
//!
//! Inbound: completed Request payloads are dispatched to the externally
//! supplied [`RequestHandler`]; its result goes back out as a Response
//! tagged with the same id. Handler failures become error-status Responses
//! so the protocol session survives handler bugs.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::MsgPackCodec;
use crate::config::WireConfig;
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::manager::RequestManager;
use crate::payload::{ReceiveResponse, Request, Response};
use crate::protocol::{InboundPayload, PayloadType};
use crate::sender::PayloadSender;

/// Routes outbound requests and inbound payloads between the caller, the
/// request manager, the payload sender, and the request handler.
pub struct ProtocolAdapter {
    handler: Arc<dyn RequestHandler>,
    manager: Arc<RequestManager>,
    sender: Arc<PayloadSender>,
    handler_permits: Arc<Semaphore>,
}

/// Removes the pending registration if the caller abandons the wait.
///
/// `resolve` removes the entry on the normal path, so this is a no-op
/// unless the future was dropped mid-flight; a response arriving after
/// abandonment is then silently discarded by the manager.
struct PendingGuard<'a> {
    manager: &'a RequestManager,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.manager.abandon(self.id);
    }
}

impl ProtocolAdapter {
    /// Create an adapter over the given collaborators.
    pub fn new(
        handler: Arc<dyn RequestHandler>,
        manager: Arc<RequestManager>,
        sender: Arc<PayloadSender>,
        config: &WireConfig,
    ) -> Self {
        Self {
            handler,
            manager,
            sender,
            handler_permits: Arc::new(Semaphore::new(config.max_concurrent_handlers)),
        }
    }

    /// Send a request and await its correlated response.
    ///
    /// Concurrent callers each get an independent pending handle; responses
    /// may resolve in any order. Fails with
    /// [`NotConnected`](crate::WireError::NotConnected) if no transport is
    /// live, or [`ConnectionLost`](crate::WireError::ConnectionLost) if the
    /// connection dies before the response arrives.
    pub async fn send_request(&self, request: Request) -> Result<ReceiveResponse> {
        let id = Uuid::new_v4();
        let rx = self.manager.register(id);
        let _guard = PendingGuard {
            manager: &self.manager,
            id,
        };

        let body = MsgPackCodec::encode(&request)?;
        self.sender
            .send_payload(id, PayloadType::Request, Bytes::from(body))
            .await?;
        // On the error path the guard has already removed the pending id.

        match rx.await {
            Ok(result) => result,
            // Manager dropped the handle without completing it.
            Err(_) => Err(crate::WireError::ConnectionLost),
        }
    }

    /// Spawn the inbound dispatch loop for one connection.
    ///
    /// Runs until the inbound channel closes (read loop ended) or the
    /// returned handle is aborted at teardown.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<InboundPayload>,
    ) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(payload) = inbound.recv().await {
                match payload.payload_type {
                    PayloadType::Response => adapter.accept_response(payload),
                    PayloadType::Request => adapter.spawn_request_handler(payload),
                    PayloadType::Stream => {
                        tracing::warn!(id = %payload.id, "stream payload with no open context, dropping");
                    }
                }
            }
        })
    }

    /// Resolve a completed Response payload against the request manager.
    fn accept_response(&self, payload: InboundPayload) {
        match MsgPackCodec::decode::<Response>(&payload.body) {
            Ok(response) => {
                self.manager.resolve(payload.id, Ok(response.into()));
            }
            Err(e) => {
                tracing::error!(id = %payload.id, error = %e, "undecodable response body");
                self.manager.resolve(payload.id, Err(e.into()));
            }
        }
    }

    /// Run the request handler for a completed Request payload.
    fn spawn_request_handler(self: &Arc<Self>, payload: InboundPayload) {
        let permit = match Arc::clone(&self.handler_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(id = %payload.id, "handler capacity reached, rejecting request");
                let adapter = Arc::clone(self);
                tokio::spawn(async move {
                    adapter
                        .send_response(payload.id, Response::error(503, "handler capacity reached"))
                        .await;
                });
                return;
            }
        };

        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;

            let response = match MsgPackCodec::decode::<Request>(&payload.body) {
                Ok(request) => match adapter.handler.handle(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(id = %payload.id, error = %e, "request handler failed");
                        Response::error(500, &e.to_string())
                    }
                },
                Err(e) => Response::error(400, &format!("malformed request body: {e}")),
            };

            adapter.send_response(payload.id, response).await;
        });
    }

    /// Send a Response payload tagged with the originating request id.
    async fn send_response(&self, id: Uuid, response: Response) {
        let body = match MsgPackCodec::encode(&response) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(%id, error = %e, "failed to encode response");
                return;
            }
        };

        if let Err(e) = self
            .sender
            .send_payload(id, PayloadType::Response, Bytes::from(body))
            .await
        {
            // The connection died under us; the remote caller is getting
            // cancelled on its own side.
            tracing::debug!(%id, error = %e, "could not send response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;
    use crate::protocol::{FrameBuffer, PayloadAssembler};
    use tokio::io::AsyncReadExt;

    fn adapter_with(
        handler: Arc<dyn RequestHandler>,
    ) -> (Arc<ProtocolAdapter>, Arc<RequestManager>, Arc<PayloadSender>) {
        let config = WireConfig::default();
        let manager = Arc::new(RequestManager::new());
        let sender = Arc::new(PayloadSender::new(&config));
        let adapter = Arc::new(ProtocolAdapter::new(
            handler,
            Arc::clone(&manager),
            Arc::clone(&sender),
            &config,
        ));
        (adapter, manager, sender)
    }

    fn echo_handler() -> Arc<dyn RequestHandler> {
        Arc::new(FnHandler::new(|request: Request| async move {
            let mut response = Response::ok();
            response.streams = request.streams;
            Ok(response)
        }))
    }

    /// Read one complete payload from the remote end of the transport.
    async fn read_one_payload(
        remote: &mut tokio::io::DuplexStream,
    ) -> crate::protocol::InboundPayload {
        let mut frame_buffer = FrameBuffer::new();
        let mut assembler = PayloadAssembler::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = remote.read(&mut buf).await.unwrap();
            assert!(n > 0, "transport closed before payload completed");
            for frame in frame_buffer.push(&buf[..n]).unwrap() {
                if let Some(payload) = assembler.push(frame).unwrap() {
                    return payload;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_send_request_not_connected() {
        let (adapter, manager, _sender) = adapter_with(echo_handler());

        let result = adapter.send_request(Request::get("/ping")).await;
        assert!(matches!(result, Err(crate::WireError::NotConnected)));
        // The pending registration was cleaned up on the failure path.
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_request_resolves_with_correlated_response() {
        let (adapter, manager, sender) = adapter_with(echo_handler());
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let pending = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send_request(Request::get("/ping")).await })
        };

        // Read the outbound request, then resolve its id as the remote
        // side would.
        let outbound = read_one_payload(&mut remote).await;
        assert_eq!(outbound.payload_type, PayloadType::Request);
        let request: Request = MsgPackCodec::decode(&outbound.body).unwrap();
        assert_eq!(request.path, "/ping");

        manager.resolve(outbound.id, Ok(Response::with_status(200).into()));

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_inbound_request_dispatched_to_handler() {
        let (adapter, _manager, sender) = adapter_with(echo_handler());
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let _dispatch = adapter.spawn_dispatch(inbound_rx);

        let id = Uuid::new_v4();
        let request =
            Request::post("/echo").add_stream(crate::payload::ContentStream::new("x", &b"y"[..]));
        let body = MsgPackCodec::encode(&request).unwrap();
        inbound_tx
            .send(InboundPayload {
                id,
                payload_type: PayloadType::Request,
                body: Bytes::from(body),
            })
            .await
            .unwrap();

        let outbound = read_one_payload(&mut remote).await;
        assert_eq!(outbound.id, id);
        assert_eq!(outbound.payload_type, PayloadType::Response);
        let response: Response = MsgPackCodec::decode(&outbound.body).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.streams, request.streams);
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_error_status_response() {
        let failing: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|_| async {
            Err(crate::WireError::Handler("kaboom".into()))
        }));
        let (adapter, _manager, sender) = adapter_with(failing);
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let _dispatch = adapter.spawn_dispatch(inbound_rx);

        let id = Uuid::new_v4();
        let body = MsgPackCodec::encode(&Request::get("/boom")).unwrap();
        inbound_tx
            .send(InboundPayload {
                id,
                payload_type: PayloadType::Request,
                body: Bytes::from(body),
            })
            .await
            .unwrap();

        let outbound = read_one_payload(&mut remote).await;
        let response: Response = MsgPackCodec::decode(&outbound.body).unwrap();
        assert_eq!(response.status_code, 500);
        let message: String = response.streams[0].decode_json().unwrap();
        assert!(message.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_malformed_request_body_becomes_400() {
        let (adapter, _manager, sender) = adapter_with(echo_handler());
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let _dispatch = adapter.spawn_dispatch(inbound_rx);

        let id = Uuid::new_v4();
        inbound_tx
            .send(InboundPayload {
                id,
                payload_type: PayloadType::Request,
                body: Bytes::from_static(&[0xC1, 0x00, 0xFF]),
            })
            .await
            .unwrap();

        let outbound = read_one_payload(&mut remote).await;
        let response: Response = MsgPackCodec::decode(&outbound.body).unwrap();
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn test_response_payload_resolves_pending_request() {
        let (adapter, manager, _sender) = adapter_with(echo_handler());

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let _dispatch = adapter.spawn_dispatch(inbound_rx);

        let id = Uuid::new_v4();
        let rx = manager.register(id);

        let body = MsgPackCodec::encode(&Response::with_status(204)).unwrap();
        inbound_tx
            .send(InboundPayload {
                id,
                payload_type: PayloadType::Response,
                body: Bytes::from(body),
            })
            .await
            .unwrap();

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.status_code, 204);
    }

    #[tokio::test]
    async fn test_unmatched_response_is_dropped_quietly() {
        let (adapter, manager, _sender) = adapter_with(echo_handler());

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let _dispatch = adapter.spawn_dispatch(inbound_rx);

        let body = MsgPackCodec::encode(&Response::ok()).unwrap();
        inbound_tx
            .send(InboundPayload {
                id: Uuid::new_v4(),
                payload_type: PayloadType::Response,
                body: Bytes::from(body),
            })
            .await
            .unwrap();

        // Give the dispatch loop a chance to process; nothing to assert
        // beyond "no panic, no state".
        tokio::task::yield_now().await;
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_caller_cancellation_removes_pending_entry() {
        let (adapter, manager, sender) = adapter_with(echo_handler());
        let (local, _remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let pending = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send_request(Request::get("/slow")).await })
        };
        // Let the request hit the wire, then abandon the caller.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(manager.pending_count(), 1);
        pending.abort();
        let _ = pending.await;

        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_request_fails_with_connection_lost_on_cancel_all() {
        let (adapter, manager, sender) = adapter_with(echo_handler());
        let (local, _remote) = tokio::io::duplex(64 * 1024);
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        sender.connect(Box::new(local), disc_tx);

        let pending = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send_request(Request::get("/doomed")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        manager.cancel_all();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(crate::WireError::ConnectionLost)));
    }
}
