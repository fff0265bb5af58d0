//! WebSocket transport client.

use crate::frame::EventFrame;
use crate::{WsError, WsResult, WsTransportConfig};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use realtime_connection::transport::{self as lifecycle, Listener, Transport};
use realtime_connection::{DisconnectReason, TransportError, TransportResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const TRANSPORT_CLOSE: &str = "transport close";
const TRANSPORT_ERROR: &str = "transport error";

type ListenerMap = Arc<RwLock<HashMap<String, Listener>>>;

enum Outbound {
    Frame(String),
    Close,
}

/// One connect attempt and, if it succeeds, the connection it opened.
struct Session {
    id: u64,
    open: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// [`Transport`] over a single WebSocket connection.
///
/// Each `connect()` starts a fresh session task that owns the socket. The
/// task reports `connect`/`connect_error` once, then `disconnect` when the
/// socket closes.
pub struct WsTransport {
    config: WsTransportConfig,
    runtime: Handle,
    listeners: ListenerMap,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
}

impl WsTransport {
    /// Create a transport bound to the current Tokio runtime.
    pub fn new(config: WsTransportConfig) -> WsResult<Self> {
        let runtime = Handle::try_current().map_err(|_| WsError::NoRuntime)?;
        Ok(Self {
            config,
            runtime,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &Url {
        &self.config.url
    }

    /// Whether a socket is currently open.
    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.open.load(Ordering::SeqCst))
    }
}

impl Transport for WsTransport {
    fn connect(&self) {
        let mut slot = self.session.lock();
        if let Some(previous) = slot.take() {
            debug!(session = previous.id, "Replacing previous session");
            previous.task.abort();
        }

        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let ctx = SessionContext {
            id,
            url: self.config.url.clone(),
            connect_timeout: self.config.connect_timeout,
            listeners: self.listeners.clone(),
            open: open.clone(),
        };
        let task = self.runtime.spawn(run_session(ctx, outbound_rx));

        *slot = Some(Session {
            id,
            open,
            outbound,
            task,
        });
    }

    fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        if session.open.load(Ordering::SeqCst) && session.outbound.send(Outbound::Close).is_ok() {
            debug!(session = session.id, "Closing WebSocket");
        } else {
            debug!(session = session.id, "Abandoning connect attempt");
            session.task.abort();
        }
    }

    fn emit(&self, event: &str, payload: &Value) -> TransportResult<()> {
        let text = EventFrame::new(event, payload.clone())
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let slot = self.session.lock();
        let session = slot
            .as_ref()
            .filter(|s| s.open.load(Ordering::SeqCst))
            .ok_or(TransportError::NotConnected)?;
        session
            .outbound
            .send(Outbound::Frame(text))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn on(&self, event: &str, listener: Listener) {
        self.listeners.write().insert(event.to_string(), listener);
    }

    fn off(&self, event: &str) {
        self.listeners.write().remove(event);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.task.abort();
        }
    }
}

struct SessionContext {
    id: u64,
    url: Url,
    connect_timeout: Duration,
    listeners: ListenerMap,
    open: Arc<AtomicBool>,
}

impl SessionContext {
    fn fire(&self, event: &str, payload: Value) {
        let listener = self.listeners.read().get(event).cloned();
        match listener {
            Some(listener) => listener(payload),
            None => debug!(session = self.id, event, "No listener"),
        }
    }

    fn dispatch(&self, text: &str) {
        match EventFrame::from_json(text) {
            Ok(frame) if lifecycle::LIFECYCLE_EVENTS.iter().any(|name| *name == frame.event) => {
                warn!(session = self.id, event = %frame.event, "Dropping frame with reserved event name");
            }
            Ok(frame) => self.fire(&frame.event, frame.data),
            Err(e) => warn!(session = self.id, error = %e, "Failed to parse frame"),
        }
    }
}

async fn run_session(ctx: SessionContext, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    info!(session = ctx.id, url = %ctx.url, "Connecting WebSocket");

    let stream = match tokio::time::timeout(ctx.connect_timeout, connect_async(ctx.url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            warn!(session = ctx.id, error = %e, "WebSocket connect failed");
            ctx.fire(lifecycle::CONNECT_ERROR, json!({ "message": e.to_string() }));
            return;
        }
        Err(_) => {
            warn!(
                session = ctx.id,
                timeout_ms = ctx.connect_timeout.as_millis() as u64,
                "WebSocket connect timed out"
            );
            ctx.fire(lifecycle::CONNECT_ERROR, json!({ "message": "timeout" }));
            return;
        }
    };

    let (mut write, mut read) = stream.split();
    ctx.open.store(true, Ordering::SeqCst);
    info!(session = ctx.id, "WebSocket connected");
    ctx.fire(lifecycle::CONNECT, Value::Null);

    let reason = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!(session = ctx.id, error = %e, "WebSocket write failed");
                        break TRANSPORT_ERROR;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break DisconnectReason::CLIENT;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => ctx.dispatch(&text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => break DisconnectReason::SERVER,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session = ctx.id, error = %e, "WebSocket error");
                    break TRANSPORT_ERROR;
                }
                None => break TRANSPORT_CLOSE,
            },
        }
    };

    ctx.open.store(false, Ordering::SeqCst);
    info!(session = ctx.id, reason, "WebSocket closed");
    ctx.fire(lifecycle::DISCONNECT, json!(reason));
}
