//! Repeated connects and re-initialization.
//!
//! - `ensure_connected()` while connecting or connected is a no-op
//! - Each lifecycle name holds exactly one listener on the transport

use super::harness::{config, connected_manager, manager, settle};
use crate::transport::LIFECYCLE_EVENTS;
use crate::ConnectionState;

#[tokio::test(start_paused = true)]
async fn ensure_connected_twice_connects_once() {
    let (manager, transport) = manager(config(Some(3)));
    manager.ensure_connected();
    manager.ensure_connected();
    settle().await;

    assert_eq!(transport.connect_count(), 1);
    for name in LIFECYCLE_EVENTS {
        assert_eq!(transport.listener_count(name), 1, "{name}");
        assert_eq!(transport.on_calls(name), 1, "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn ensure_connected_while_connected_is_noop() {
    let (manager, transport) = connected_manager().await;
    manager.ensure_connected();
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_cycles_never_stack_listeners() {
    let (manager, transport) = manager(config(Some(3)));
    manager
        .subscribe("server_response", |_| {})
        .expect("subscribe");

    for _ in 0..5 {
        manager.ensure_connected();
        transport.accept();
        settle().await;
        transport.drop_connection("transport close");
        settle().await;
    }

    for name in LIFECYCLE_EVENTS.iter().chain(["server_response"].iter()) {
        assert_eq!(transport.listener_count(name), 1, "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn auto_connect_on_construction() {
    let mut config = config(Some(3));
    config.auto_connect = true;
    let (manager, transport) = manager(config);
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_count(), 1);
}
