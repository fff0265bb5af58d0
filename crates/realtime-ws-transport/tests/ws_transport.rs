//! WebSocket transport against an in-process server.

use futures_util::{SinkExt, StreamExt};
use realtime_connection::transport::Transport;
use realtime_connection::{
    ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState, ManagerConfig,
    RetryPolicy,
};
use realtime_ws_transport::{WsTransport, WsTransportConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

/// Replies to `client_event` with `server_response`; closes on `close_me`.
async fn start_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    match frame["event"].as_str() {
                        Some("client_event") => {
                            let reply = json!({
                                "event": "server_response",
                                "data": {
                                    "data": "Server received your event",
                                    "original_payload": frame["data"],
                                },
                            });
                            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                                return;
                            }
                        }
                        Some("close_me") => {
                            let _ = ws.close(None).await;
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, handle)
}

fn ws_transport(addr: SocketAddr) -> Arc<WsTransport> {
    let url = Url::parse(&format!("http://{addr}")).unwrap();
    Arc::new(WsTransport::new(WsTransportConfig::new(&url).unwrap()).unwrap())
}

fn manager_config(max_attempts: Option<u32>) -> ManagerConfig {
    ManagerConfig {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            jitter_factor: 0.0,
        },
        send_grace: Duration::from_millis(500),
        auto_connect: false,
        event_capacity: 64,
    }
}

fn channel_listener(tx: mpsc::UnboundedSender<Value>) -> realtime_connection::Listener {
    Arc::new(move |payload: Value| {
        let _ = tx.send(payload);
    })
}

#[tokio::test]
async fn probe_round_trip_through_manager() {
    let (addr, server) = start_server().await;
    let manager = ConnectionManager::new(manager_config(Some(3)), ws_transport(addr));

    let (tx, mut replies) = mpsc::unbounded_channel();
    manager
        .subscribe("server_response", move |payload: &Value| {
            let _ = tx.send(payload.clone());
        })
        .unwrap();

    manager.ensure_connected();
    timeout(WAIT, manager.connected()).await.unwrap().unwrap();

    let receipt = manager
        .send("client_event", &json!({ "message": "Hello from Rust" }))
        .unwrap();
    assert!(receipt.sent_now());

    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply["original_payload"]["message"], "Hello from Rust");

    manager.disconnect();
    server.abort();
}

#[tokio::test]
async fn deferred_send_reaches_server() {
    let (addr, server) = start_server().await;
    let manager = ConnectionManager::new(manager_config(Some(3)), ws_transport(addr));

    let (tx, mut replies) = mpsc::unbounded_channel();
    manager
        .subscribe("server_response", move |payload: &Value| {
            let _ = tx.send(payload.clone());
        })
        .unwrap();

    // Not connected yet: this send starts the connection
    let receipt = manager.send("client_event", &json!({ "n": 1 })).unwrap();
    assert!(!receipt.sent_now());
    timeout(WAIT, receipt.outcome()).await.unwrap().unwrap();

    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply["original_payload"]["n"], 1);

    manager.disconnect();
    server.abort();
}

#[tokio::test]
async fn server_close_reports_server_disconnect() {
    let (addr, server) = start_server().await;
    let transport = ws_transport(addr);

    let (connected_tx, mut connected) = mpsc::unbounded_channel();
    let (closed_tx, mut closed) = mpsc::unbounded_channel();
    transport.on("connect", channel_listener(connected_tx));
    transport.on("disconnect", channel_listener(closed_tx));

    transport.connect();
    timeout(WAIT, connected.recv()).await.unwrap().unwrap();
    assert!(transport.is_open());

    transport.emit("close_me", &Value::Null).unwrap();
    let reason = timeout(WAIT, closed.recv()).await.unwrap().unwrap();
    assert_eq!(reason, json!("io server disconnect"));
    assert!(!transport.is_open());

    server.abort();
}

#[tokio::test]
async fn local_disconnect_reports_client_disconnect() {
    let (addr, server) = start_server().await;
    let transport = ws_transport(addr);

    let (connected_tx, mut connected) = mpsc::unbounded_channel();
    let (closed_tx, mut closed) = mpsc::unbounded_channel();
    transport.on("connect", channel_listener(connected_tx));
    transport.on("disconnect", channel_listener(closed_tx));

    transport.connect();
    timeout(WAIT, connected.recv()).await.unwrap().unwrap();

    transport.disconnect();
    let reason = timeout(WAIT, closed.recv()).await.unwrap().unwrap();
    assert_eq!(reason, json!("io client disconnect"));

    server.abort();
}

#[tokio::test]
async fn manager_reconnects_after_server_close() {
    let (addr, server) = start_server().await;
    let manager = ConnectionManager::new(manager_config(Some(3)), ws_transport(addr));
    let mut events = manager.events();

    manager.ensure_connected();
    timeout(WAIT, manager.connected()).await.unwrap().unwrap();

    manager.send("close_me", &Value::Null).unwrap();

    let saw_drop = timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::StateChanged {
                    previous: ConnectionState::Connected,
                    current: ConnectionState::Disconnected,
                }) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(saw_drop);

    timeout(WAIT, manager.connected()).await.unwrap().unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect();
    server.abort();
}

#[tokio::test]
async fn refused_connection_is_terminal_without_retries() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = ws_transport(addr);
    let (errors_tx, mut errors) = mpsc::unbounded_channel();
    transport.on("connect_error", channel_listener(errors_tx));
    transport.connect();
    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(error["message"].is_string());

    let manager = ConnectionManager::new(manager_config(Some(0)), ws_transport(addr));
    manager.ensure_connected();
    let result = timeout(WAIT, manager.connected()).await.unwrap();
    assert!(matches!(
        result,
        Err(ConnectionError::TerminalConnectFailure { attempts: 1, .. })
    ));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
