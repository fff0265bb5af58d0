//! Subcommand implementations.

pub mod listen;
pub mod probe;

use realtime_config::RealtimeConfig;
use realtime_connection::ConnectionManager;
use realtime_ws_transport::{WsTransport, WsTransportConfig};
use std::sync::Arc;
use tracing::info;

/// Build a manager over a WebSocket transport for the configured endpoint.
fn open_manager(config: &RealtimeConfig) -> anyhow::Result<ConnectionManager> {
    let transport = WsTransport::new(WsTransportConfig::from_realtime(config)?)?;
    info!(url = %transport.url(), "Using event stream");
    Ok(ConnectionManager::from_config(config, Arc::new(transport)))
}
