//! Error types for the WebSocket transport.

use realtime_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    /// Endpoint scheme has no WebSocket equivalent
    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// Configuration could not produce an endpoint
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Transport created outside a Tokio runtime
    #[error("No Tokio runtime available")]
    NoRuntime,
}

/// Result type alias using WsError.
pub type WsResult<T> = Result<T, WsError>;
