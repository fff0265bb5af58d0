//! quant-stream - command-line client for the quant dashboard event stream.
//!
//! Usage: quant-stream [--url <url>] [--page-url <url>] <probe|listen>

mod commands;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use realtime_config::{Paths, RealtimeConfig};
use tracing::info;

/// Probe and watch the quant dashboard event stream.
#[derive(Parser, Debug)]
#[command(name = "quant-stream")]
#[command(about = "Probe and watch the quant dashboard event stream")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Event-stream endpoint. Overrides the page-derived endpoint.
    #[arg(long, env = "QUANT_STREAM_URL", global = true)]
    url: Option<String>,

    /// Dashboard page URL the endpoint is derived from.
    #[arg(long, env = "QUANT_PAGE_URL", global = true)]
    page_url: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write JSONL logs to ~/.quant-dashboard/logs/realtime.jsonl
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one event and wait for the server's reply
    Probe {
        /// Event to send
        #[arg(long, default_value = "client_event")]
        event: String,

        /// JSON payload. Defaults to {"message", "timestamp"}.
        #[arg(long)]
        payload: Option<String>,

        /// Event the server replies with
        #[arg(long, default_value = "server_response")]
        reply_event: String,

        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },

    /// Print inbound events until interrupted
    Listen {
        /// Events to subscribe to
        #[arg(long = "event", default_value = "server_response")]
        events: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new()?;
    let mut config = RealtimeConfig::load(&paths).context("Failed to load configuration")?;
    if let Some(url) = cli.url.clone() {
        config.endpoint_override = Some(url);
    }
    if let Some(page_url) = cli.page_url.clone() {
        config.page_url = Some(page_url);
    }
    if let Some(level) = cli.log_level.clone() {
        config.log_level = level;
    }

    let log_path = if cli.log_file {
        paths.ensure_dirs()?;
        Some(paths.log_file())
    } else {
        None
    };
    observability::init_with_config(observability::LogConfig {
        service_name: "quant-stream".into(),
        default_level: config.log_level.clone(),
        log_path,
        also_stderr: true,
    })
    .context("Failed to initialize logging")?;

    let endpoint = config.endpoint()?;
    info!(
        endpoint = %endpoint,
        max_attempts = ?config.retry.max_attempts,
        grace_ms = config.send_grace_ms,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Probe {
            event,
            payload,
            reply_event,
            timeout_secs,
        } => {
            let args = commands::probe::ProbeArgs {
                event,
                payload,
                reply_event,
                timeout: std::time::Duration::from_secs(timeout_secs),
            };
            commands::probe::run(&config, args, cli.format).await
        }
        Commands::Listen { events } => commands::listen::run(&config, &events, cli.format).await,
    }
}
