//! End-to-end tests over the in-process transport.
//!
//! Each test wires two full endpoints together and exercises the whole
//! stack: payload encoding, framing, reassembly, correlation, and the
//! session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use duplexwire::transport::memory::{link, MemoryConnector};
use duplexwire::{
    ConnectionState, ContentStream, DuplexEndpoint, FnHandler, ReconnectPolicy, Request,
    RequestHandler, Response, WireConfig, WireError,
};

fn echo_handler() -> Arc<dyn RequestHandler> {
    Arc::new(FnHandler::new(|request: Request| async move {
        let mut response = Response::ok();
        response.streams = request.streams;
        Ok(response)
    }))
}

fn one_shot_config() -> WireConfig {
    WireConfig {
        reconnect: ReconnectPolicy::disabled(),
        ..WireConfig::default()
    }
}

fn fast_reconnect_config() -> WireConfig {
    WireConfig {
        reconnect: ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        },
        ..WireConfig::default()
    }
}

/// Two endpoints joined by one in-memory link, reconnect disabled.
fn linked_endpoints(
    handler_a: Arc<dyn RequestHandler>,
    handler_b: Arc<dyn RequestHandler>,
) -> (DuplexEndpoint, DuplexEndpoint) {
    let (connector_a, connector_b) = MemoryConnector::pair(256 * 1024);
    let a = DuplexEndpoint::start(Arc::new(connector_a), handler_a, one_shot_config());
    let b = DuplexEndpoint::start(Arc::new(connector_b), handler_b, one_shot_config());
    (a, b)
}

#[tokio::test]
async fn test_request_response_roundtrip() {
    let handler: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|request: Request| async move {
        assert_eq!(request.verb, "GET");
        assert_eq!(request.path, "/ping");
        Ok(Response::ok().add_stream(ContentStream::new("body", &b"pong"[..])))
    }));

    let (caller, responder) = linked_endpoints(echo_handler(), handler);
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let response = caller.send_request(Request::get("/ping")).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.streams.len(), 1);
    assert_eq!(&response.streams[0].content[..], b"pong");

    caller.disconnect().await;
    responder.disconnect().await;
}

#[tokio::test]
async fn test_requests_flow_both_directions() {
    let (a, b) = linked_endpoints(echo_handler(), echo_handler());
    a.wait_connected().await.unwrap();
    b.wait_connected().await.unwrap();

    let from_a = a.send_request(Request::get("/a-to-b")).await.unwrap();
    let from_b = b.send_request(Request::get("/b-to-a")).await.unwrap();
    assert_eq!(from_a.status_code, 200);
    assert_eq!(from_b.status_code, 200);

    a.disconnect().await;
    b.disconnect().await;
}

#[tokio::test]
async fn test_large_payload_reassembled_exactly() {
    // 10 MiB of patterned bytes, spanning thousands of 4 KiB frames.
    let body: Vec<u8> = (0..10 * 1024 * 1024u32)
        .map(|i| (i % 251) as u8)
        .collect();

    let (caller, responder) = linked_endpoints(echo_handler(), echo_handler());
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let request =
        Request::post("/upload").add_stream(ContentStream::new("blob", body.clone()));
    let response = caller.send_request(request).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.streams[0].content.len(), body.len());
    assert_eq!(&response.streams[0].content[..], &body[..]);

    caller.disconnect().await;
    responder.disconnect().await;
}

#[tokio::test]
async fn test_concurrent_requests_resolve_to_their_own_callers() {
    // Responder echoes the request path back, so cross-resolution would be
    // visible as a mismatched body.
    let handler: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|request: Request| async move {
        // Stagger completions so responses come back out of order.
        let delay = request.path.len() as u64 % 7;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Response::ok().add_stream(ContentStream::new("path", request.path.into_bytes())))
    }));

    let (caller, responder) = linked_endpoints(echo_handler(), handler);
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let caller = Arc::new(caller);
    let mut tasks = Vec::new();
    for i in 0..32 {
        let caller = Arc::clone(&caller);
        tasks.push(tokio::spawn(async move {
            let path = format!("/item/{i}");
            let response = caller.send_request(Request::get(&path)).await.unwrap();
            assert_eq!(&response.streams[0].content[..], path.as_bytes());
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    caller.disconnect().await;
    responder.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_before_response_fails_pending_caller() {
    // The responder never answers; its handler parks forever.
    let black_hole: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|_request: Request| async {
        std::future::pending::<()>().await;
        Ok(Response::ok())
    }));

    let (caller, responder) = linked_endpoints(echo_handler(), black_hole);
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let caller = Arc::new(caller);
    let pending = {
        let caller = Arc::clone(&caller);
        tokio::spawn(async move { caller.send_request(Request::get("/never")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Kill the responder's side of the link; the caller must resolve with
    // an error rather than hang.
    responder.disconnect().await;
    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("pending request must not hang")
        .unwrap();
    assert!(matches!(result, Err(WireError::ConnectionLost)));

    caller.disconnect().await;
}

#[tokio::test]
async fn test_handler_error_maps_to_error_status() {
    let failing: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|_request: Request| async {
        Err(WireError::Handler("backend unavailable".into()))
    }));

    let (caller, responder) = linked_endpoints(echo_handler(), failing);
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let response = caller.send_request(Request::get("/fails")).await.unwrap();
    assert_eq!(response.status_code, 500);
    let message: String = response.streams[0].decode_json().unwrap();
    assert!(message.contains("backend unavailable"));

    caller.disconnect().await;
    responder.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_restores_service_after_session_loss() {
    // Endpoint A reconnects through a queue; each queued session is backed
    // by a fresh full endpoint on the far side.
    let (queue, connector) = MemoryConnector::queue();

    let (first_pair, first_peer) = link(64 * 1024);
    queue.offer(first_pair);
    let first_responder = {
        let (peer_queue, peer_connector) = MemoryConnector::queue();
        peer_queue.offer(first_peer);
        DuplexEndpoint::start(Arc::new(peer_connector), echo_handler(), one_shot_config())
    };

    let caller = DuplexEndpoint::start(
        Arc::new(connector),
        echo_handler(),
        fast_reconnect_config(),
    );
    caller.wait_connected().await.unwrap();

    let response = caller.send_request(Request::get("/one")).await.unwrap();
    assert_eq!(response.status_code, 200);

    // First session dies.
    first_responder.disconnect().await;
    while caller.state() == ConnectionState::Connected {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Second session comes up; the endpoint recovers without intervention.
    let (second_pair, second_peer) = link(64 * 1024);
    let second_responder = {
        let (peer_queue, peer_connector) = MemoryConnector::queue();
        peer_queue.offer(second_peer);
        DuplexEndpoint::start(Arc::new(peer_connector), echo_handler(), one_shot_config())
    };
    queue.offer(second_pair);
    caller.wait_connected().await.unwrap();

    let response = caller.send_request(Request::get("/two")).await.unwrap();
    assert_eq!(response.status_code, 200);

    caller.disconnect().await;
    second_responder.disconnect().await;
}

#[tokio::test]
async fn test_corrupt_inbound_stream_tears_down_session() {
    // Hand-feed garbage into an endpoint's read side; the session must be
    // declared dead instead of resynchronizing on untrustworthy boundaries.
    let (queue, connector) = MemoryConnector::queue();
    let (pair, peer) = link(4096);
    queue.offer(pair);

    let endpoint = DuplexEndpoint::start(Arc::new(connector), echo_handler(), one_shot_config());
    endpoint.wait_connected().await.unwrap();

    use tokio::io::AsyncWriteExt;
    let mut peer_write = peer.write;
    peer_write.write_all(&[0xFFu8; 22]).await.unwrap();
    peer_write.flush().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while endpoint.state() == ConnectionState::Connected {
        assert!(tokio::time::Instant::now() < deadline, "teardown did not happen");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    endpoint.disconnect().await;
}

#[tokio::test]
async fn test_empty_payload_roundtrip() {
    // A request with no streams still frames, ships, and correlates.
    let (caller, responder) = linked_endpoints(echo_handler(), echo_handler());
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    let response = caller.send_request(Request::get("")).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert!(response.streams.is_empty());

    caller.disconnect().await;
    responder.disconnect().await;
}

#[tokio::test]
async fn test_connect_failure_with_reconnect_disabled_ends_supervisor() {
    let (queue, connector) = MemoryConnector::queue();
    drop(queue); // Every open() fails immediately.

    let endpoint = DuplexEndpoint::start(Arc::new(connector), echo_handler(), one_shot_config());

    // wait_connected observes the supervisor giving up.
    let result = endpoint.wait_connected().await;
    assert!(matches!(result, Err(WireError::NotConnected)));
    assert_eq!(endpoint.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_sequential_requests_reuse_one_session() {
    let (caller, responder) = linked_endpoints(echo_handler(), echo_handler());
    caller.wait_connected().await.unwrap();
    responder.wait_connected().await.unwrap();

    for i in 0..50 {
        let body = vec![i as u8; 1000 + i * 37];
        let request = Request::post("/seq").add_stream(ContentStream::new("n", body.clone()));
        let response = caller.send_request(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(&response.streams[0].content[..], &body[..]);
    }
    assert!(caller.is_connected());

    caller.disconnect().await;
    responder.disconnect().await;
}
