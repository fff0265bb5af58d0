//! `quant-stream listen`: print inbound events until Ctrl-C.

use crate::output::{self, OutputFormat};
use anyhow::bail;
use realtime_config::RealtimeConfig;
use realtime_connection::{ConnectionEvent, ConnectionState};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

pub async fn run(config: &RealtimeConfig, events: &[String], format: OutputFormat) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;

    let (tx, mut inbound) = mpsc::unbounded_channel::<(String, Value)>();
    for event in events {
        let tx = tx.clone();
        let name = event.clone();
        manager.subscribe(event, move |payload: &Value| {
            let _ = tx.send((name.clone(), payload.clone()));
        })?;
    }
    drop(tx);

    let mut changes = manager.events();
    manager.ensure_connected();
    info!(events = ?events, "Listening");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            Some((event, payload)) = inbound.recv() => {
                output::print_event(&event, &payload, format);
            }
            change = changes.recv() => match change {
                Ok(ConnectionEvent::StateChanged { current: ConnectionState::Connected, .. }) => {
                    output::print_status("connected", format);
                }
                Ok(ConnectionEvent::StateChanged { current, .. }) => {
                    debug!(state = %current, "Connection state changed");
                }
                Ok(ConnectionEvent::ReconnectScheduled { .. }) => {}
                Ok(ConnectionEvent::TerminalFailure { attempts, reason }) => {
                    break Err((attempts, reason));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Missed connection events");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            _ = &mut ctrl_c => {
                info!("Received shutdown signal, exiting...");
                break Ok(());
            }
        }
    };

    manager.disconnect();
    if let Err((attempts, reason)) = outcome {
        bail!("Gave up connecting after {attempts} attempts: {reason}");
    }
    Ok(())
}
