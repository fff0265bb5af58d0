//! Configuration, endpoint resolution and filesystem paths for the realtime
//! connection.

mod config;
mod endpoint;
mod error;
mod paths;

pub use config::{RealtimeConfig, RetrySettings, DEFAULT_LOG_LEVEL};
pub use endpoint::{resolve_endpoint, BACKEND_PORT, LOCAL_ENDPOINT};
pub use error::{ConfigError, ConfigResult};
pub use paths::Paths;
