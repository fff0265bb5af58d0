//! Scenario tests for the connection manager.
//!
//! - `harness.rs`       - Mock transport and manager construction helpers
//! - `backoff.rs`       - Bounded reconnect backoff and terminal failure
//! - `idempotence.rs`   - Repeated connects register listeners once
//! - `send.rs`          - Immediate and deferred sends
//! - `disconnect.rs`    - Caller disconnect, cancellation and teardown
//! - `subscriptions.rs` - Replace-not-append handlers and dispatch order
//! - `reconnect.rs`     - Automatic reconnect after a lost connection

mod idempotence;
mod reconnect;
