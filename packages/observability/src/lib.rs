//! # Observability
//!
//! Logging setup shared by the realtime crates.
//!
//! Library crates only use `tracing` macros. Binaries call
//! [`init_with_config`] once at startup to decide where the events go:
//!
//! - stderr, compact human-readable lines (default)
//! - a JSONL file, one structured entry per line, when `log_path` is set
//!
//! `RUST_LOG` always wins over the configured default level.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "quant-stream".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     })
//!     .expect("logging");
//! }
//! ```

mod file_sink;
mod json_layer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_sink::{default_log_path, LineWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "quant-stream").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Write structured JSONL to this file.
    pub log_path: Option<PathBuf>,

    /// Keep emitting compact lines to stderr when a file sink is active.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging to stderr at `info` for the given service.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize the global subscriber.
///
/// Fails if the log file cannot be opened. A second initialization in the
/// same process is ignored.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let writer = LineWriter::open(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = if json_layer.is_none() || config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(io::stderr)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};
