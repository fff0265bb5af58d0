//! Automatic reconnect after a lost connection.
//!
//! - Server and transport disconnects reconnect with a fresh budget
//! - Client disconnects stay closed

use super::harness::{advance, connected_manager, drain, ms, settle};
use crate::{ConnectionEvent, ConnectionState};

#[tokio::test(start_paused = true)]
async fn server_disconnect_reconnects() {
    let (manager, transport) = connected_manager().await;
    let mut events = manager.events();

    transport.drop_connection("io server disconnect");
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(
        drain(&mut events),
        vec![
            ConnectionEvent::StateChanged {
                previous: ConnectionState::Connected,
                current: ConnectionState::Disconnected,
            },
            ConnectionEvent::StateChanged {
                previous: ConnectionState::Disconnected,
                current: ConnectionState::Connecting,
            },
        ]
    );

    transport.accept();
    settle().await;
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn transport_close_reconnects_with_fresh_budget() {
    let (manager, transport) = connected_manager().await;

    transport.drop_connection("transport close");
    settle().await;
    assert_eq!(manager.retry_attempts(), 0);

    transport.refuse("refused");
    settle().await;
    advance(ms(1000)).await;
    assert_eq!(transport.connect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn client_disconnect_reason_stays_closed() {
    let (manager, transport) = connected_manager().await;

    transport.drop_connection("io client disconnect");
    settle().await;
    advance(ms(30_000)).await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_not_a_state_change() {
    let (manager, transport) = connected_manager().await;
    let mut events = manager.events();

    transport.fire("error", serde_json::json!({ "message": "parse error" }));
    settle().await;

    assert!(manager.is_connected());
    assert!(drain(&mut events).is_empty());
}
