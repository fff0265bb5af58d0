//! `quant-stream probe`: send one event and wait for the reply.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context};
use chrono::Utc;
use realtime_config::RealtimeConfig;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{info, warn};

pub struct ProbeArgs {
    pub event: String,
    pub payload: Option<String>,
    pub reply_event: String,
    pub timeout: Duration,
}

pub async fn run(config: &RealtimeConfig, args: ProbeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let payload = match args.payload.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => default_payload(),
    };
    let deadline = Instant::now() + args.timeout;

    let manager = super::open_manager(config)?;
    let (tx, mut replies) = mpsc::unbounded_channel();
    manager.subscribe(&args.reply_event, move |reply: &Value| {
        let _ = tx.send(reply.clone());
    })?;

    manager.ensure_connected();
    let result: anyhow::Result<Value> = async {
        timeout_at(deadline, manager.connected())
            .await
            .context("Timed out waiting for connection")?
            .context("Connection failed")?;
        info!(event = %args.event, "Connected, sending probe");

        manager
            .send(&args.event, &payload)?
            .outcome()
            .await
            .with_context(|| format!("Failed to send '{}'", args.event))?;

        wait_for_reply(&mut replies, deadline, &args.reply_event).await
    }
    .await;
    manager.disconnect();

    let reply = result?;
    output::print_event(&args.reply_event, &reply, format);
    Ok(())
}

/// `{message, timestamp}`, matching what the dashboard's smoke test sends.
fn default_payload() -> Value {
    json!({
        "message": "Hello from quant-stream",
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// First reply echoing our payload, else the first reply seen by `deadline`.
async fn wait_for_reply(
    replies: &mut mpsc::UnboundedReceiver<Value>,
    deadline: Instant,
    reply_event: &str,
) -> anyhow::Result<Value> {
    let mut fallback = None;
    loop {
        tokio::select! {
            reply = replies.recv() => match reply {
                Some(reply) if is_echo(&reply) => return Ok(reply),
                Some(reply) => {
                    fallback.get_or_insert(reply);
                }
                None => bail!("Connection closed before '{reply_event}' arrived"),
            },
            _ = sleep_until(deadline) => {
                return match fallback {
                    Some(reply) => {
                        warn!("Reply did not echo the probe payload");
                        Ok(reply)
                    }
                    None => bail!("No '{reply_event}' received before timeout"),
                };
            }
        }
    }
}

fn is_echo(reply: &Value) -> bool {
    reply.get("original_payload").is_some()
}
