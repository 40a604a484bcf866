//! Session supervision: connection lifecycle and the public endpoints.
//!
//! A [`DuplexEndpoint`] owns one supervisor task that drives the session
//! state machine:
//!
//! ```text
//! Connecting ──open ok──► Connected ──disconnect──► teardown ─┐
//!     ▲                                                       │
//!     └───────────────── backoff (if reconnect enabled) ◄─────┘
//! ```
//!
//! Teardown runs exactly once per session: detach the sender, abort the
//! read loop, stop dispatch, then cancel every pending request so no
//! caller is left awaiting a response that can no longer arrive. Each
//! session gets a fresh disconnect channel, so a stale notification from a
//! dead session can never tear down its successor.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::adapter::ProtocolAdapter;
use crate::config::{ReconnectPolicy, WireConfig};
use crate::error::{Result, WireError};
use crate::handler::{FnHandler, RequestHandler};
use crate::manager::RequestManager;
use crate::payload::{ReceiveResponse, Request, Response};
use crate::receiver::PayloadReceiver;
use crate::sender::PayloadSender;
use crate::transport::pipe::{PipeClientConnector, PipeServerConnector};
use crate::transport::{Connector, DisconnectReason};

/// Observable lifecycle state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no attempt in progress.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Both half-channels are live; requests flow.
    Connected,
}

/// One side of a duplex session, with its supervisor task.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct DuplexEndpoint {
    adapter: Arc<ProtocolAdapter>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl DuplexEndpoint {
    /// Fluent construction when only a few tunables change.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder {
            config: WireConfig::default(),
            handler: None,
        }
    }

    /// Spawn an endpoint over the given connector.
    ///
    /// The supervisor starts connecting immediately; use
    /// [`wait_connected`](Self::wait_connected) to await the first session.
    pub fn start(
        connector: Arc<dyn Connector>,
        handler: Arc<dyn RequestHandler>,
        config: WireConfig,
    ) -> Self {
        let manager = Arc::new(RequestManager::new());
        let sender = Arc::new(PayloadSender::new(&config));
        let receiver = Arc::new(PayloadReceiver::new(&config));
        let adapter = Arc::new(ProtocolAdapter::new(
            handler,
            Arc::clone(&manager),
            Arc::clone(&sender),
            &config,
        ));

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = tokio::spawn(supervise(
            connector,
            Arc::clone(&adapter),
            manager,
            sender,
            receiver,
            config,
            state_tx,
            shutdown_rx,
        ));

        Self {
            adapter,
            state_rx,
            shutdown: shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    /// Send a request over the current session and await its response.
    ///
    /// # Errors
    ///
    /// [`NotConnected`](WireError::NotConnected) if no session is live, or
    /// [`ConnectionLost`](WireError::ConnectionLost) if the session dies
    /// before the response arrives. A reconnect does not replay in-flight
    /// requests; the caller decides what is safe to retry.
    pub async fn send_request(&self, request: Request) -> Result<ReceiveResponse> {
        self.adapter.send_request(request).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether a session is currently live.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until a session is live.
    ///
    /// # Errors
    ///
    /// [`NotConnected`](WireError::NotConnected) if the supervisor exits
    /// before reaching `Connected` (shutdown, or connect failure with
    /// reconnect disabled).
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        state_rx
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| WireError::NotConnected)
    }

    /// Shut the endpoint down and wait for the supervisor to finish.
    ///
    /// Pending requests are cancelled with `ConnectionLost`. Idempotent;
    /// a second call returns immediately.
    pub async fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = supervisor {
            let _ = task.await;
        }
    }
}

/// Supervisor task: one iteration per session attempt.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    connector: Arc<dyn Connector>,
    adapter: Arc<ProtocolAdapter>,
    manager: Arc<RequestManager>,
    sender: Arc<PayloadSender>,
    receiver: Arc<PayloadReceiver>,
    config: WireConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    'supervise: loop {
        publish(&state_tx, ConnectionState::Connecting);

        let pair = tokio::select! {
            _ = shutdown.changed() => break 'supervise,
            result = connector.open() => match result {
                Ok(pair) => {
                    attempt = 0;
                    pair
                }
                Err(e) => {
                    tracing::warn!(error = %e, "connection attempt failed");
                    if !config.reconnect.enabled {
                        break 'supervise;
                    }
                    let delay = config.reconnect.delay_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        _ = shutdown.changed() => break 'supervise,
                        _ = tokio::time::sleep(delay) => continue 'supervise,
                    }
                }
            },
        };

        // Wire up one session. The disconnect channel is per-session; both
        // halves share it, and the first notification wins.
        let (disc_tx, mut disc_rx) = mpsc::channel::<DisconnectReason>(2);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        sender.connect(pair.write, disc_tx.clone());
        receiver.connect(pair.read, inbound_tx, disc_tx);
        let dispatch = adapter.spawn_dispatch(inbound_rx);

        publish(&state_tx, ConnectionState::Connected);
        tracing::info!("session established");

        let shutting_down = tokio::select! {
            _ = shutdown.changed() => true,
            reason = disc_rx.recv() => {
                let reason = reason.unwrap_or(DisconnectReason::Local);
                tracing::warn!(%reason, "session lost");
                false
            }
        };

        // Teardown, in dependency order: stop producing bytes, stop
        // consuming bytes, stop dispatching, then fail every caller still
        // waiting on this session.
        sender.disconnect();
        receiver.disconnect();
        dispatch.abort();
        let cancelled = manager.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled pending requests at disconnect");
        }

        if shutting_down || *shutdown.borrow() || !config.reconnect.enabled {
            break 'supervise;
        }

        let delay = config.reconnect.delay_for_attempt(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!(?delay, "reconnecting after backoff");
        tokio::select! {
            _ = shutdown.changed() => break 'supervise,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    publish(&state_tx, ConnectionState::Disconnected);
}

/// Publish a state transition, skipping no-op repeats.
fn publish(state_tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}

/// Fluent builder for a [`DuplexEndpoint`].
///
/// # Example
///
/// ```ignore
/// let endpoint = DuplexEndpoint::builder()
///     .handler(handler)
///     .max_concurrent_handlers(32)
///     .reconnect(ReconnectPolicy::disabled())
///     .start(connector);
/// ```
pub struct EndpointBuilder {
    config: WireConfig,
    handler: Option<Arc<dyn RequestHandler>>,
}

impl EndpointBuilder {
    /// Handler for inbound requests.
    ///
    /// An endpoint built without one answers every inbound request with
    /// status 404.
    pub fn handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: WireConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum frame body size used when chunking outbound payloads.
    pub fn max_frame_body(mut self, bytes: usize) -> Self {
        self.config.max_frame_body = bytes;
        self
    }

    /// Cap on a fully reassembled inbound payload.
    pub fn max_payload_size(mut self, bytes: usize) -> Self {
        self.config.max_payload_size = bytes;
        self
    }

    /// Capacity of the outbound and inbound channels.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Maximum concurrent inbound request handlers.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Reconnect policy applied after a disconnect.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Spawn the endpoint over the given connector.
    pub fn start(self, connector: Arc<dyn Connector>) -> DuplexEndpoint {
        let handler = self.handler.unwrap_or_else(|| {
            Arc::new(FnHandler::new(|request: Request| async move {
                tracing::warn!(verb = %request.verb, path = %request.path,
                    "inbound request but no handler installed");
                Ok(Response::with_status(404))
            }))
        });
        DuplexEndpoint::start(connector, handler, self.config)
    }
}

/// Server side of a named pipe pair session.
///
/// Binds both pipes at construction, then accepts one client at a time;
/// with reconnection enabled, a dropped client is replaced by the next one
/// to connect.
pub struct DuplexServer {
    endpoint: DuplexEndpoint,
    base_name: String,
}

impl DuplexServer {
    /// Bind the pipe pair for `base_name` and start accepting.
    ///
    /// # Errors
    ///
    /// Fails if either pipe cannot be bound.
    pub fn bind(base_name: &str, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        Self::bind_with_config(base_name, handler, WireConfig::default())
    }

    /// [`bind`](Self::bind) with explicit tunables.
    pub fn bind_with_config(
        base_name: &str,
        handler: Arc<dyn RequestHandler>,
        config: WireConfig,
    ) -> Result<Self> {
        let connector = Arc::new(PipeServerConnector::bind(base_name)?);
        Ok(Self {
            endpoint: DuplexEndpoint::start(connector, handler, config),
            base_name: base_name.to_string(),
        })
    }

    /// Wait for the first client session to be established.
    pub async fn start(&self) -> Result<()> {
        self.endpoint.wait_connected().await
    }

    /// The base name both pipe paths derive from.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// The underlying endpoint.
    pub fn endpoint(&self) -> &DuplexEndpoint {
        &self.endpoint
    }

    /// Send a request to the connected client.
    pub async fn send_request(&self, request: Request) -> Result<ReceiveResponse> {
        self.endpoint.send_request(request).await
    }

    /// Whether a client session is currently live.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Stop accepting and tear down the current session.
    pub async fn disconnect(&self) {
        self.endpoint.disconnect().await;
    }
}

/// Client side of a named pipe pair session.
pub struct DuplexClient {
    endpoint: DuplexEndpoint,
    base_name: String,
}

impl DuplexClient {
    /// Start connecting to the server listening on `base_name`.
    pub fn connect(base_name: &str, handler: Arc<dyn RequestHandler>) -> Self {
        Self::connect_with_config(base_name, handler, WireConfig::default())
    }

    /// [`connect`](Self::connect) with explicit tunables.
    pub fn connect_with_config(
        base_name: &str,
        handler: Arc<dyn RequestHandler>,
        config: WireConfig,
    ) -> Self {
        let connector = Arc::new(PipeClientConnector::new(base_name));
        Self {
            endpoint: DuplexEndpoint::start(connector, handler, config),
            base_name: base_name.to_string(),
        }
    }

    /// Wait for the session to be established.
    pub async fn start(&self) -> Result<()> {
        self.endpoint.wait_connected().await
    }

    /// The base name both pipe paths derive from.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// The underlying endpoint.
    pub fn endpoint(&self) -> &DuplexEndpoint {
        &self.endpoint
    }

    /// Send a request to the server.
    pub async fn send_request(&self, request: Request) -> Result<ReceiveResponse> {
        self.endpoint.send_request(request).await
    }

    /// Whether the session is currently live.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Tear the session down and stop reconnecting.
    pub async fn disconnect(&self) {
        self.endpoint.disconnect().await;
    }
}
