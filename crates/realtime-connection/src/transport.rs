//! The seam between the manager and the underlying event stream.
//!
//! A transport handles handshake and framing. It reports its lifecycle
//! through the reserved event names below, using the same `on`/`off`
//! registration as application events:
//!
//! | event           | payload                          |
//! |-----------------|----------------------------------|
//! | `connect`       | ignored                          |
//! | `connect_error` | reason string or `{ "message" }` |
//! | `disconnect`    | reason string                    |
//! | `error`         | reason string or `{ "message" }` |

use crate::TransportResult;
use serde_json::Value;
use std::sync::Arc;

/// Connection established.
pub const CONNECT: &str = "connect";
/// A connect attempt failed.
pub const CONNECT_ERROR: &str = "connect_error";
/// An established connection closed.
pub const DISCONNECT: &str = "disconnect";
/// Non-fatal transport error.
pub const ERROR: &str = "error";

/// Names reserved for transport lifecycle signals.
pub const LIFECYCLE_EVENTS: [&str; 4] = [CONNECT, CONNECT_ERROR, DISCONNECT, ERROR];

/// Callback invoked by the transport with the event payload.
///
/// Listeners may be called from any thread and must not block.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Bidirectional named-event stream.
///
/// All methods are non-blocking: `connect` and `disconnect` start the work
/// and report completion through lifecycle events.
pub trait Transport: Send + Sync {
    /// Begin connecting. Outcome arrives as `connect` or `connect_error`.
    fn connect(&self);

    /// Close the connection. Reported as `disconnect` if one was open.
    fn disconnect(&self);

    /// Write one named event.
    fn emit(&self, event: &str, payload: &Value) -> TransportResult<()>;

    /// Register the listener for `event`, replacing any previous one.
    fn on(&self, event: &str, listener: Listener);

    /// Remove the listener for `event`, if any.
    fn off(&self, event: &str);
}

/// Extract a human-readable reason from a lifecycle payload.
pub fn reason_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}
