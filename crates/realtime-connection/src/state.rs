//! Connection state and the notifications published on transitions.

use std::fmt;
use std::time::Duration;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Includes the wait between reconnect attempts.
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Why an established connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session.
    Server,
    /// Our own `disconnect()`.
    Client,
    /// The underlying stream dropped (closed, errored, ping timeout).
    Transport(String),
}

impl DisconnectReason {
    pub const SERVER: &'static str = "io server disconnect";
    pub const CLIENT: &'static str = "io client disconnect";

    pub fn parse(reason: &str) -> Self {
        match reason {
            Self::SERVER => Self::Server,
            Self::CLIENT => Self::Client,
            other => Self::Transport(other.to_string()),
        }
    }

    /// Only caller-initiated closes stay closed.
    pub fn should_reconnect(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str(Self::SERVER),
            Self::Client => f.write_str(Self::CLIENT),
            Self::Transport(reason) => f.write_str(reason),
        }
    }
}

/// Events published by the manager, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// State transition.
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// A connect attempt failed and one retry timer is armed.
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// Retries exhausted. Only `ensure_connected()` recovers from this.
    TerminalFailure { attempts: u32, reason: String },
}
