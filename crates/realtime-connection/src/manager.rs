//! Connection manager: state machine, retry timer and deferred sends.
//!
//! All transitions happen under one lock. Transport listeners never take
//! that lock; they only forward signals to a single loop task, so transport
//! calls made while holding it cannot re-enter.

use crate::policy::RetryPolicy;
use crate::registry::HandlerRegistry;
use crate::state::{ConnectionEvent, ConnectionState, DisconnectReason};
use crate::transport::{self, Listener, Transport, LIFECYCLE_EVENTS};
use crate::{ConnectionError, ConnectionResult};
use parking_lot::Mutex;
use realtime_config::RealtimeConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub retry: RetryPolicy,
    /// How long a send issued while disconnected waits before its one retry.
    pub send_grace: Duration,
    /// Call `ensure_connected()` on construction.
    pub auto_connect: bool,
    /// Capacity of the [`ConnectionEvent`] broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for ManagerConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            send_grace: config.send_grace(),
            auto_connect: config.auto_connect,
            event_capacity: 100,
        }
    }
}

/// Result of [`ConnectionManager::send`].
#[derive(Debug)]
pub enum SendReceipt {
    /// Written to the transport immediately.
    Sent,
    /// Not connected; one retry is scheduled after the grace window.
    Deferred(DeferredSend),
}

impl SendReceipt {
    /// Whether the event went out synchronously.
    pub fn sent_now(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Wait for the final outcome of this send.
    pub async fn outcome(self) -> ConnectionResult<()> {
        match self {
            Self::Sent => Ok(()),
            Self::Deferred(deferred) => deferred.outcome().await,
        }
    }
}

/// Handle to a send waiting for the connection.
#[derive(Debug)]
pub struct DeferredSend {
    event: String,
    rx: oneshot::Receiver<ConnectionResult<()>>,
}

impl DeferredSend {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Resolves once the grace window elapses (or on `disconnect()`).
    pub async fn outcome(self) -> ConnectionResult<()> {
        self.rx.await.unwrap_or(Err(ConnectionError::Closed))
    }
}

/// Transport signal tagged with the connection epoch it belongs to.
#[derive(Debug)]
struct Signal {
    epoch: u64,
    kind: SignalKind,
}

#[derive(Debug)]
enum SignalKind {
    Connected,
    ConnectError(String),
    Disconnected(DisconnectReason),
    Error(String),
    Event { name: String, payload: Value },
}

impl SignalKind {
    fn from_event(name: &str, payload: Value) -> Self {
        match name {
            transport::CONNECT => Self::Connected,
            transport::CONNECT_ERROR => Self::ConnectError(transport::reason_text(&payload)),
            transport::DISCONNECT => {
                Self::Disconnected(DisconnectReason::parse(&transport::reason_text(&payload)))
            }
            transport::ERROR => Self::Error(transport::reason_text(&payload)),
            _ => Self::Event {
                name: name.to_string(),
                payload,
            },
        }
    }
}

struct ScheduledRetry {
    generation: u64,
    handle: JoinHandle<()>,
}

struct PendingSend {
    event: String,
    payload: Value,
    reply: oneshot::Sender<ConnectionResult<()>>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    /// Consecutive failed connect attempts.
    attempts: u32,
    /// Bumped on every fresh connect and on teardown.
    epoch: u64,
    retry: Option<ScheduledRetry>,
    retry_generation: u64,
    /// Attempts and reason of the last terminal failure, until the next connect.
    terminal: Option<(u32, String)>,
    pending: HashMap<u64, PendingSend>,
    next_send_id: u64,
    handlers: HandlerRegistry,
    /// Event names currently registered on the transport.
    listening: BTreeSet<String>,
}

struct Inner {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    shared: Mutex<Shared>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_loop: Mutex<Option<JoinHandle<()>>>,
    weak: Weak<Inner>,
}

/// Owns one logical connection to an event-stream endpoint.
///
/// Cloning yields another handle to the same connection. Must be created
/// inside a Tokio runtime; timers and the signal loop are spawned tasks.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`ConnectionManager`].
#[derive(Clone)]
pub struct WeakConnectionManager {
    inner: Weak<Inner>,
}

impl WeakConnectionManager {
    /// `None` once the last [`ConnectionManager`] handle is gone.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.inner.upgrade().map(|inner| ConnectionManager { inner })
    }
}

impl ConnectionManager {
    /// Create a manager that exclusively drives `transport`.
    pub fn new(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let auto_connect = config.auto_connect;

        let inner = Arc::new_cyclic(|weak| Inner {
            config,
            transport,
            shared: Mutex::new(Shared::default()),
            events_tx,
            signal_tx,
            signal_loop: Mutex::new(None),
            weak: weak.clone(),
        });

        let handle = tokio::spawn(run_signal_loop(Arc::downgrade(&inner), signal_rx));
        *inner.signal_loop.lock() = Some(handle);

        let manager = Self { inner };
        if auto_connect {
            manager.ensure_connected();
        }
        manager
    }

    /// Create a manager from the on-disk configuration.
    pub fn from_config(config: &RealtimeConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(ManagerConfig::from(config), transport)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Handle that does not keep the connection alive.
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive failed connect attempts since the last success.
    pub fn retry_attempts(&self) -> u32 {
        self.inner.shared.lock().attempts
    }

    /// Sends waiting for their grace window.
    pub fn pending_sends(&self) -> usize {
        self.inner.shared.lock().pending.len()
    }

    /// Subscribe to state-change notifications.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Start connecting unless already connecting or connected.
    ///
    /// Resets the retry counter, so this is also how callers recover from a
    /// terminal failure.
    pub fn ensure_connected(&self) {
        let mut shared = self.inner.shared.lock();
        self.inner.ensure_connected_locked(&mut shared);
    }

    /// Tear the connection down and stay down.
    ///
    /// Cancels the retry timer and every deferred send. Safe to call twice.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();

        inner.cancel_retry(&mut shared);
        shared.epoch += 1;
        shared.attempts = 0;
        shared.terminal = None;
        inner.unlisten_all(&mut shared);

        if shared.state != ConnectionState::Disconnected {
            inner.transport.disconnect();
            inner.set_state(&mut shared, ConnectionState::Disconnected);
            info!("Disconnected by caller");
        } else {
            debug!("Already disconnected");
        }

        let cancelled: Vec<PendingSend> = shared.pending.drain().map(|(_, p)| p).collect();
        drop(shared);

        for pending in cancelled {
            pending.timer.abort();
            debug!(event = %pending.event, "Cancelled deferred send");
            let _ = pending.reply.send(Err(ConnectionError::SendCancelled {
                event: pending.event,
            }));
        }
    }

    /// Send a named event with a JSON-serializable payload.
    pub fn send<P>(&self, event: &str, payload: &P) -> ConnectionResult<SendReceipt>
    where
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        self.send_value(event, payload)
    }

    /// Send a named event.
    ///
    /// Connected: written immediately. Otherwise the manager starts
    /// connecting and retries this send exactly once after the grace window;
    /// the returned [`DeferredSend`] reports whether it went out.
    pub fn send_value(&self, event: &str, payload: Value) -> ConnectionResult<SendReceipt> {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();

        if shared.state == ConnectionState::Connected {
            inner.emit(event, &payload)?;
            debug!(event, "Sent");
            return Ok(SendReceipt::Sent);
        }

        let id = shared.next_send_id;
        shared.next_send_id += 1;

        let (reply, rx) = oneshot::channel();
        let grace = inner.config.send_grace;
        let deadline = Instant::now() + grace;
        let weak = inner.weak.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_grace_elapsed(id);
            }
        });

        shared.pending.insert(
            id,
            PendingSend {
                event: event.to_string(),
                payload,
                reply,
                timer,
            },
        );
        warn!(
            event,
            state = %shared.state,
            grace_ms = grace.as_millis() as u64,
            "Not connected, deferring send"
        );

        inner.ensure_connected_locked(&mut shared);

        Ok(SendReceipt::Deferred(DeferredSend {
            event: event.to_string(),
            rx,
        }))
    }

    /// Handle inbound `event` with `handler`, replacing any earlier handler.
    ///
    /// Handlers are owned by the manager. A handler that calls back into the
    /// manager should capture a [`WeakConnectionManager`] from
    /// [`downgrade`](Self::downgrade); a strong clone keeps the connection
    /// alive after every other handle is dropped.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> ConnectionResult<()>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if LIFECYCLE_EVENTS.iter().any(|name| *name == event) {
            return Err(ConnectionError::ReservedEvent(event.to_string()));
        }

        let inner = &self.inner;
        let mut shared = inner.shared.lock();
        if shared.handlers.register(event, Arc::new(handler)).is_some() {
            debug!(event, "Replaced existing handler");
        }
        if shared.state != ConnectionState::Disconnected {
            inner.listen(&mut shared, event);
        }
        Ok(())
    }

    /// Remove the handler for `event`. Returns whether one was registered.
    pub fn unsubscribe(&self, event: &str) -> bool {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();
        let removed = shared.handlers.remove(event).is_some();
        if shared.listening.remove(event) {
            inner.transport.off(event);
        }
        removed
    }

    /// Wait until connected.
    ///
    /// Fails with [`ConnectionError::TerminalConnectFailure`] once retries
    /// are exhausted, including when that already happened before the call.
    /// Waits indefinitely after a caller `disconnect()`.
    pub async fn connected(&self) -> ConnectionResult<()> {
        let mut events = self.events();
        loop {
            // A lagged receiver may have missed the terminal notification
            if let Some(outcome) = self.inner.settled() {
                return outcome;
            }
            match events.recv().await {
                Ok(ConnectionEvent::StateChanged {
                    current: ConnectionState::Connected,
                    ..
                }) => return Ok(()),
                Ok(ConnectionEvent::TerminalFailure { attempts, reason }) => {
                    return Err(ConnectionError::TerminalConnectFailure { attempts, reason })
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(ConnectionError::Closed),
            }
        }
    }
}

impl Inner {
    fn settled(&self) -> Option<ConnectionResult<()>> {
        let shared = self.shared.lock();
        match (shared.state, &shared.terminal) {
            (ConnectionState::Connected, _) => Some(Ok(())),
            (ConnectionState::Disconnected, Some((attempts, reason))) => {
                Some(Err(ConnectionError::TerminalConnectFailure {
                    attempts: *attempts,
                    reason: reason.clone(),
                }))
            }
            _ => None,
        }
    }

    fn ensure_connected_locked(&self, shared: &mut Shared) {
        if shared.state != ConnectionState::Disconnected {
            debug!(state = %shared.state, "Already connecting or connected");
            return;
        }
        shared.attempts = 0;
        self.open(shared);
    }

    /// Start a fresh connection epoch.
    fn open(&self, shared: &mut Shared) {
        shared.epoch += 1;
        shared.terminal = None;
        self.cancel_retry(shared);

        let names: Vec<String> = LIFECYCLE_EVENTS
            .iter()
            .map(|name| name.to_string())
            .chain(shared.handlers.event_names())
            .collect();
        for name in &names {
            self.listen(shared, name);
        }

        self.set_state(shared, ConnectionState::Connecting);
        info!(epoch = shared.epoch, "Connecting");
        self.transport.connect();
    }

    /// Off-then-on, so the transport never holds two listeners for a name.
    fn listen(&self, shared: &mut Shared, name: &str) {
        self.transport.off(name);
        self.transport.on(name, self.forwarder(shared.epoch, name));
        shared.listening.insert(name.to_string());
    }

    fn unlisten_all(&self, shared: &mut Shared) {
        for name in std::mem::take(&mut shared.listening) {
            self.transport.off(&name);
        }
    }

    fn forwarder(&self, epoch: u64, name: &str) -> Listener {
        let tx = self.signal_tx.clone();
        let name = name.to_string();
        Arc::new(move |payload: Value| {
            let kind = SignalKind::from_event(&name, payload);
            let _ = tx.send(Signal { epoch, kind });
        })
    }

    fn set_state(&self, shared: &mut Shared, next: ConnectionState) {
        if shared.state == next {
            return;
        }
        let previous = std::mem::replace(&mut shared.state, next);
        debug!(%previous, current = %next, "State changed");
        let _ = self.events_tx.send(ConnectionEvent::StateChanged {
            previous,
            current: next,
        });
    }

    fn emit(&self, event: &str, payload: &Value) -> ConnectionResult<()> {
        self.transport
            .emit(event, payload)
            .map_err(|e| ConnectionError::TransportEmit {
                event: event.to_string(),
                reason: e.to_string(),
            })
    }

    fn handle_signal(&self, signal: Signal) {
        let mut shared = self.shared.lock();
        if signal.epoch != shared.epoch {
            debug!(
                signal_epoch = signal.epoch,
                epoch = shared.epoch,
                "Ignoring stale transport signal"
            );
            return;
        }

        match signal.kind {
            SignalKind::Connected => {
                if shared.state != ConnectionState::Connecting {
                    debug!(state = %shared.state, "Ignoring connect signal");
                    return;
                }
                shared.attempts = 0;
                self.cancel_retry(&mut shared);
                self.set_state(&mut shared, ConnectionState::Connected);
                info!("Connected");
            }
            SignalKind::ConnectError(reason) => {
                if shared.state != ConnectionState::Connecting {
                    debug!(state = %shared.state, reason = %reason, "Ignoring connect error");
                    return;
                }
                self.on_connect_failure(&mut shared, reason);
            }
            SignalKind::Disconnected(reason) => match shared.state {
                ConnectionState::Connected => {
                    self.set_state(&mut shared, ConnectionState::Disconnected);
                    if reason.should_reconnect() {
                        info!(reason = %reason, "Connection lost, reconnecting");
                        shared.attempts = 0;
                        self.open(&mut shared);
                    } else {
                        info!(reason = %reason, "Connection closed");
                    }
                }
                ConnectionState::Connecting => {
                    self.on_connect_failure(&mut shared, reason.to_string());
                }
                ConnectionState::Disconnected => {
                    debug!(reason = %reason, "Ignoring disconnect while disconnected");
                }
            },
            SignalKind::Error(reason) => {
                warn!(reason = %reason, "Transport error");
            }
            SignalKind::Event { name, payload } => {
                let handler = shared.handlers.get(&name);
                drop(shared);
                match handler {
                    Some(handler) => handler(&payload),
                    None => debug!(event = %name, "No handler for inbound event"),
                }
            }
        }
    }

    fn on_connect_failure(&self, shared: &mut Shared, reason: String) {
        shared.attempts = shared.attempts.saturating_add(1);
        let attempt = shared.attempts;

        if self.config.retry.allows_retry(attempt) {
            let delay = self.config.retry.delay_for(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Connect failed, scheduling reconnect"
            );
            self.arm_retry(shared, delay);
            let _ = self.events_tx.send(ConnectionEvent::ReconnectScheduled {
                attempt,
                delay,
                reason,
            });
        } else {
            error!(attempts = attempt, reason = %reason, "Reconnect attempts exhausted");
            self.cancel_retry(shared);
            self.transport.disconnect();
            self.set_state(shared, ConnectionState::Disconnected);
            shared.terminal = Some((attempt, reason.clone()));
            let _ = self.events_tx.send(ConnectionEvent::TerminalFailure {
                attempts: attempt,
                reason,
            });
        }
    }

    /// Replace the retry timer with one firing after `delay`.
    fn arm_retry(&self, shared: &mut Shared, delay: Duration) {
        self.cancel_retry(shared);
        shared.retry_generation += 1;
        let generation = shared.retry_generation;

        let deadline = Instant::now() + delay;
        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_retry_due(generation);
            }
        });
        shared.retry = Some(ScheduledRetry { generation, handle });
    }

    fn cancel_retry(&self, shared: &mut Shared) {
        if let Some(retry) = shared.retry.take() {
            retry.handle.abort();
        }
    }

    fn on_retry_due(&self, generation: u64) {
        let mut shared = self.shared.lock();
        match &shared.retry {
            Some(retry) if retry.generation == generation => {}
            _ => return,
        }
        shared.retry = None;

        if shared.state != ConnectionState::Connecting {
            return;
        }
        info!(attempt = shared.attempts, "Retrying connect");
        self.transport.connect();
    }

    fn on_grace_elapsed(&self, id: u64) {
        let mut shared = self.shared.lock();
        let Some(pending) = shared.pending.remove(&id) else {
            return;
        };

        let outcome = if shared.state == ConnectionState::Connected {
            self.emit(&pending.event, &pending.payload)
        } else {
            Err(ConnectionError::SendWhileDisconnected {
                event: pending.event.clone(),
            })
        };
        drop(shared);

        match &outcome {
            Ok(()) => info!(event = %pending.event, "Delivered deferred send"),
            Err(e) => warn!(event = %pending.event, error = %e, "Deferred send failed"),
        }
        let _ = pending.reply.send(outcome);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.signal_loop.get_mut().take() {
            handle.abort();
        }

        let shared = self.shared.get_mut();
        if let Some(retry) = shared.retry.take() {
            retry.handle.abort();
        }
        for (_, pending) in shared.pending.drain() {
            pending.timer.abort();
        }
        for name in std::mem::take(&mut shared.listening) {
            self.transport.off(&name);
        }
        if shared.state != ConnectionState::Disconnected {
            self.transport.disconnect();
        }
    }
}

async fn run_signal_loop(inner: Weak<Inner>, mut signals: mpsc::UnboundedReceiver<Signal>) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_signal(signal);
    }
}
