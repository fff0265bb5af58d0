//! Reconnecting event-stream connection manager.
//!
//! This crate provides:
//! - A [`Transport`] seam for the underlying bidirectional event stream
//! - [`ConnectionManager`]: connect/disconnect state machine with bounded,
//!   jittered reconnect backoff and exactly one retry timer
//! - Replace-not-append handler registration for inbound named events
//! - Best-effort sends with a single deferred retry while disconnected
//!
//! ```text
//! caller ──ensure_connected/send/subscribe──▶ ConnectionManager ──▶ Transport
//!    ▲                                              │   ▲                │
//!    └──────── ConnectionEvent (broadcast) ◀────────┘   └── signals ◀────┘
//! ```

mod error;
mod manager;
mod policy;
mod registry;
mod state;
pub mod transport;

#[cfg(test)]
mod tests;

pub use error::{ConnectionError, ConnectionResult, TransportError, TransportResult};
pub use manager::{
    ConnectionManager, DeferredSend, ManagerConfig, SendReceipt, WeakConnectionManager,
};
pub use policy::RetryPolicy;
pub use registry::EventHandler;
pub use state::{ConnectionEvent, ConnectionState, DisconnectReason};
pub use transport::{Listener, Transport};
