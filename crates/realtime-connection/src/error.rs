//! Connection and transport error types.

use thiserror::Error;

/// Errors surfaced to callers of the connection manager.
///
/// Transient connect errors never appear here; they are retried internally
/// and only show up as [`crate::ConnectionEvent::ReconnectScheduled`].
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Reconnect attempts exhausted
    #[error("Gave up connecting after {attempts} failed attempts: {reason}")]
    TerminalConnectFailure { attempts: u32, reason: String },

    /// Deferred send dropped because the connection was not up in time
    #[error("Not connected; dropped '{event}' after the grace window")]
    SendWhileDisconnected { event: String },

    /// Transport refused the payload
    #[error("Transport rejected '{event}': {reason}")]
    TransportEmit { event: String, reason: String },

    /// Deferred send cancelled by an explicit disconnect
    #[error("Send of '{event}' cancelled by disconnect")]
    SendCancelled { event: String },

    /// Lifecycle event names cannot be subscribed to
    #[error("'{0}' is a reserved lifecycle event")]
    ReservedEvent(String),

    /// Payload could not be converted to JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manager dropped while the caller was waiting
    #[error("Connection manager closed")]
    Closed,
}

/// Result type alias using ConnectionError.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors reported by a [`crate::Transport`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No live connection to write to
    #[error("Transport not connected")]
    NotConnected,

    /// Write failed
    #[error("Failed to send frame: {0}")]
    Send(String),

    /// Frame could not be encoded
    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
