//! WebSocket transport for the realtime connection manager.
//!
//! This crate provides:
//! - [`WsTransport`]: a [`realtime_connection::Transport`] over `tokio-tungstenite`
//! - JSON `{"event", "data"}` text framing
//! - Endpoint mapping from `http(s)` to `ws(s)`

mod client;
mod config;
mod error;
mod frame;

pub use client::WsTransport;
pub use config::{to_websocket_url, WsTransportConfig};
pub use error::{WsError, WsResult};
pub use frame::EventFrame;
