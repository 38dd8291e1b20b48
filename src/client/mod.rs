//! Duplex WebSocket client
//!
//! [`DuplexClient`] keeps one long-lived connection open, pushes every
//! unsolicited inbound message to a listener through a background receive
//! loop, and lets callers run request/response exchanges over the same
//! socket.
//!
//! State is split across two lock domains:
//! - the lifecycle domain (session, listener, last error, connect
//!   parameters) behind a `parking_lot` mutex, plus an async mutex that
//!   serializes connect, reconnect and disconnect;
//! - the I/O domain, the transport itself, behind a FIFO `tokio` mutex
//!   shared by exchanges and the receive loop.
//!
//! Listener callbacks always run with neither lifecycle lock held.

mod classify;
mod exchange;
mod framing;
mod gate;
mod listener;
mod receive_loop;
mod reconnect;
mod session;

pub use classify::{classify, Disposition, ReconnectPolicy};
pub use listener::{ChannelListener, ClientEvent, ClientListener};
pub use reconnect::{ReconnectScheduler, ReconnectTarget};
pub use session::{Cookies, SessionInfo};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::transport::{ConnectionState, Connector, StateHandle, WsConnector};
use framing::{bound, millis};
use gate::{IoGate, IoSession, TransportSlot};
use session::{ConnectParams, Session};

/// Returned by exchanges when no connection is open
pub const NOT_CONNECTED: &str = "CONNECTION_CLOSED";

/// Default receive-loop interval
pub const DEFAULT_AUTO_RECEIVE_INTERVAL: Duration = Duration::from_millis(5000);

/// Default delay before a scheduled reconnect
pub const DEFAULT_AUTO_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Default read chunk size
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Read chunk size used by [`DuplexClient::drain`]
pub const DEFAULT_DRAIN_BUFFER_SIZE: usize = 2048;

/// Upper bound on the closing handshake during disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Client behaviour, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Receive-loop interval; also the idle read bound and heartbeat period.
    /// Zero disables the loop.
    pub auto_receive_interval: Duration,
    /// Schedule a reconnect after connection-level failures
    pub auto_reconnect: bool,
    /// Delay before a scheduled reconnect; zero selects the default
    pub auto_reconnect_delay: Duration,
    /// Handshake bound for connects driven by configuration; zero means
    /// unbounded
    pub connect_timeout: Duration,
    /// Read chunk size for the loop and exchanges; zero selects the default
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_receive_interval: DEFAULT_AUTO_RECEIVE_INTERVAL,
            auto_reconnect: false,
            auto_reconnect_delay: DEFAULT_AUTO_RECONNECT_DELAY,
            connect_timeout: Duration::ZERO,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Replace zero values that have a non-zero default
    pub fn normalized(mut self) -> Self {
        if self.auto_reconnect_delay.is_zero() {
            self.auto_reconnect_delay = DEFAULT_AUTO_RECONNECT_DELAY;
        }
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self
    }

    /// Whether the background receive loop runs
    pub fn receive_loop_enabled(&self) -> bool {
        !self.auto_receive_interval.is_zero()
    }
}

// ─────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Lifecycle {
    session: Option<Session>,
    /// State of the current or most recent transport
    status: StateHandle,
    last_params: Option<ConnectParams>,
    cookies: Cookies,
    listener: Option<Arc<dyn ClientListener>>,
    loop_task: Option<JoinHandle<()>>,
    loop_shutdown: Option<watch::Sender<bool>>,
    last_error: Option<Arc<Error>>,
    error_pending: bool,
    /// Connection-closed already reported for the current session
    closed_notified: bool,
    /// `shutdown` was called; no further connects
    shut_down: bool,
    /// The caller asked to disconnect; scheduled reconnects stand down
    /// until the next explicit connect or reconnect
    disconnect_requested: bool,
}

pub(crate) struct Inner {
    me: Weak<Inner>,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    lifecycle: Mutex<Lifecycle>,
    transitions: tokio::sync::Mutex<()>,
    io: tokio::sync::Mutex<TransportSlot>,
    gate: IoGate,
    scheduler: ReconnectScheduler,
    loop_exited: Arc<AtomicBool>,
    closing: Notify,
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

/// Long-lived WebSocket client with a background receive loop
///
/// Share it between tasks behind an `Arc`. Dropping the last handle stops
/// the receive loop and any pending reconnect.
pub struct DuplexClient {
    inner: Arc<Inner>,
}

impl DuplexClient {
    /// Create a client using the WebSocket connector
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Create a client using a custom connector
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let config = config.normalized();
        let scheduler = ReconnectScheduler::new(config.auto_reconnect, config.auto_reconnect_delay);
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            config,
            connector,
            lifecycle: Mutex::new(Lifecycle::default()),
            transitions: tokio::sync::Mutex::new(()),
            io: tokio::sync::Mutex::new(None),
            gate: IoGate::default(),
            scheduler,
            loop_exited: Arc::new(AtomicBool::new(true)),
            closing: Notify::new(),
        });
        Self { inner }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Open a connection, replacing any existing one
    ///
    /// `heartbeat` is sent at the start of every receive-loop iteration when
    /// present and not blank. `timeout` bounds the handshake; zero means
    /// unbounded. Failures are reported through the error path and return
    /// `false`.
    pub async fn connect(&self, uri: &str, heartbeat: Option<&str>, timeout: Duration) -> bool {
        let _transition = self.inner.transitions.lock().await;
        let params = ConnectParams {
            uri: uri.trim().to_string(),
            heartbeat: heartbeat
                .filter(|h| !h.trim().is_empty())
                .map(str::to_string),
            timeout,
        };
        self.inner.lifecycle.lock().disconnect_requested = false;
        self.inner.connect_locked(params).await
    }

    /// Connect again with the parameters of the last `connect` call
    pub async fn reconnect(&self) -> bool {
        let _transition = self.inner.transitions.lock().await;
        self.inner.lifecycle.lock().disconnect_requested = false;
        self.inner.reconnect_locked().await
    }

    /// Close the connection and stop the receive loop
    ///
    /// Idempotent. Returns `false` if the closing handshake failed; the
    /// client is disconnected either way. Cancels a pending reconnect, and
    /// no reconnect is scheduled until the next `connect` or `reconnect`.
    pub async fn disconnect(&self) -> bool {
        self.inner.lifecycle.lock().disconnect_requested = true;
        self.inner.scheduler.cancel();

        let _transition = self.inner.transitions.lock().await;
        let closed = self.inner.disconnect_locked().await;
        // A failing in-flight exchange may have armed the timer meanwhile
        self.inner.scheduler.cancel();
        closed
    }

    /// Disconnect for good
    ///
    /// Cancels the reconnect timer, detaches the listener and refuses every
    /// later `connect`.
    pub async fn shutdown(&self) -> bool {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.shut_down = true;
            lifecycle.listener = None;
        }
        self.inner.closing.notify_waiters();
        self.inner.scheduler.cancel();

        let _transition = self.inner.transitions.lock().await;
        let closed = self.inner.disconnect_locked().await;
        info!("Client shut down");
        closed
    }

    /// Whether the current transport is open
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Native state of the current or most recent transport
    pub fn connection_status(&self) -> ConnectionState {
        self.inner.connection_status()
    }

    /// The last recorded error; clears the pending flag
    pub fn last_error(&self) -> Option<Arc<Error>> {
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.error_pending = false;
        lifecycle.last_error.clone()
    }

    /// Whether an error was recorded since the last [`Self::last_error`] call
    pub fn has_pending_error(&self) -> bool {
        self.inner.lifecycle.lock().error_pending
    }

    /// Install the listener, replacing any previous one
    pub fn set_listener(&self, listener: Arc<dyn ClientListener>) {
        self.inner.lifecycle.lock().listener = Some(listener);
    }

    pub fn clear_listener(&self) {
        self.inner.lifecycle.lock().listener = None;
    }

    /// Install a [`ChannelListener`] and return its event stream
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (listener, events) = ChannelListener::new();
        self.set_listener(listener);
        events
    }

    /// Cookies presented by the next handshake
    pub fn set_cookies(&self, cookies: Cookies) {
        self.inner.lifecycle.lock().cookies = cookies;
    }

    pub fn cookies(&self) -> Cookies {
        self.inner.lifecycle.lock().cookies.clone()
    }

    /// Snapshot of the current session
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.inner.lifecycle.lock().session.as_ref().map(Session::info)
    }

    /// Whether the background receive loop is running
    pub fn is_receive_loop_running(&self) -> bool {
        let has_task = self.inner.lifecycle.lock().loop_task.is_some();
        has_task && !self.inner.loop_exited.load(Ordering::SeqCst)
    }

    /// Whether a reconnect is scheduled
    pub fn is_reconnect_pending(&self) -> bool {
        self.inner.scheduler.is_armed()
    }

    /// Send `command` and return the next complete inbound message
    ///
    /// Returns [`NOT_CONNECTED`] when no connection is open and an empty
    /// string on failure or timeout. A zero `buffer_size` selects the
    /// configured chunk size; a zero `timeout` waits indefinitely.
    pub async fn exchange(&self, command: &str, buffer_size: usize, timeout: Duration) -> String {
        self.inner.exchange(command, buffer_size, timeout).await
    }

    /// Send `command` and read messages until one matches `pattern`
    ///
    /// Returns the matching message, [`NOT_CONNECTED`], or an empty string
    /// when `timeout` elapses first. The deadline bounds every read.
    pub async fn exchange_until_match(
        &self,
        command: &str,
        pattern: &regex::Regex,
        timeout: Duration,
    ) -> String {
        self.inner.exchange_until_match(command, pattern, timeout).await
    }

    /// Read one pending message without sending anything
    ///
    /// Bounded by the receive interval; an empty string means nothing was
    /// waiting.
    pub async fn drain(&self) -> String {
        let timeout = if self.inner.config.receive_loop_enabled() {
            self.inner.config.auto_receive_interval
        } else {
            DEFAULT_AUTO_RECEIVE_INTERVAL
        };
        self.inner.drain(DEFAULT_DRAIN_BUFFER_SIZE, timeout).await
    }

    /// [`Self::drain`] with an explicit chunk size and bound (zero: unbounded)
    pub async fn drain_with(&self, buffer_size: usize, timeout: Duration) -> String {
        self.inner.drain(buffer_size, timeout).await
    }
}

impl Drop for DuplexClient {
    fn drop(&mut self) {
        self.inner.scheduler.cancel();
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.shut_down = true;
        if let Some(shutdown) = lifecycle.loop_shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection Lifecycle
// ─────────────────────────────────────────────────────────────────

impl Inner {
    async fn connect_locked(&self, params: ConnectParams) -> bool {
        if self.lifecycle.lock().shut_down {
            warn!("Connect refused: client is shut down");
            return false;
        }

        let has_session = self.lifecycle.lock().session.is_some();
        if has_session {
            debug!("Replacing existing connection");
            self.disconnect_locked().await;
        }

        if params.uri.is_empty() {
            warn!("Connect skipped: empty URI");
            return false;
        }

        let status = StateHandle::new(ConnectionState::Connecting);
        let cookies = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.last_params = Some(params.clone());
            lifecycle.status = status.clone();
            lifecycle.closed_notified = false;
            lifecycle.cookies.clone()
        };

        let uri = match Url::parse(&params.uri) {
            Ok(uri) => uri,
            Err(e) => {
                status.set(ConnectionState::Closed);
                self.handle_failure(Error::InvalidUri {
                    uri: params.uri.clone(),
                    message: e.to_string(),
                });
                return false;
            }
        };

        info!(uri = %uri, "Connecting");
        let attempt = async {
            let handshake = self.connector.connect(&uri, &cookies);
            match bound(params.timeout) {
                Some(limit) => tokio::time::timeout(limit, handshake)
                    .await
                    .map_err(|_| Error::ConnectTimeout {
                        uri: params.uri.clone(),
                        timeout_ms: millis(limit),
                    })?,
                None => handshake.await,
            }
        };
        let result = tokio::select! {
            result = attempt => result,
            _ = self.closing.notified() => Err(Error::Shutdown),
        };

        let transport = match result {
            Ok(transport) => transport,
            Err(error) => {
                status.set(ConnectionState::Closed);
                warn!(uri = %uri, error = %error, "Connect failed");
                if !classify(&error).notify_state {
                    self.notify_state_changed(false, ConnectionState::Closed);
                }
                self.handle_failure(error);
                self.request_reconnect();
                return false;
            }
        };

        let native = transport.state();
        {
            let mut io = self.claim_io().await;
            if let Some(stale) = io.install(transport) {
                warn!("Dropping a transport left behind by an earlier session");
                stale.state().set(ConnectionState::Closed);
            }
        }

        let (loop_shutdown, shutdown_rx) = watch::channel(false);
        let installed = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.shut_down {
                false
            } else {
                lifecycle.status = native.clone();
                lifecycle.session = Some(Session::new(
                    uri.clone(),
                    params.heartbeat.clone(),
                    cookies,
                    native.clone(),
                ));
                lifecycle.loop_shutdown = Some(loop_shutdown);
                true
            }
        };

        if !installed {
            debug!("Client shut down during handshake; dropping new transport");
            if let Some(transport) = self.claim_io().await.take() {
                transport.state().set(ConnectionState::Closed);
            }
            return false;
        }

        if self.config.receive_loop_enabled() {
            self.loop_exited.store(false, Ordering::SeqCst);
            let task = tokio::spawn(receive_loop::run(
                self.me.clone(),
                shutdown_rx,
                self.loop_exited.clone(),
            ));
            self.lifecycle.lock().loop_task = Some(task);
        }

        info!(uri = %uri, "Connected");
        self.notify_state_changed(native.is_open(), native.get());
        true
    }

    async fn reconnect_locked(&self) -> bool {
        let params = self.lifecycle.lock().last_params.clone();
        match params {
            Some(params) => {
                info!(uri = %params.uri, "Reconnecting");
                self.connect_locked(params).await
            }
            None => {
                debug!("Reconnect skipped: never connected");
                false
            }
        }
    }

    /// Tear down the current connection
    ///
    /// Order: stop the loop and wait for it, claim the transport, close it,
    /// drop the session.
    async fn disconnect_locked(&self) -> bool {
        let (loop_task, loop_shutdown) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.session.is_none() {
                return true;
            }
            (lifecycle.loop_task.take(), lifecycle.loop_shutdown.take())
        };

        if let Some(shutdown) = loop_shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(task) = loop_task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    self.handle_failure(Error::Internal("receive loop panicked".to_string()));
                }
            }
        }

        let mut closed_cleanly = true;
        {
            let mut io = self.claim_io().await;
            if let Some(mut transport) = io.take() {
                let state = transport.state();
                if state.is_open() {
                    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close("client disconnect")).await {
                        Ok(Ok(())) => debug!("Closing handshake complete"),
                        Ok(Err(e)) => {
                            debug!(error = %e, "Closing handshake failed");
                            closed_cleanly = false;
                        }
                        Err(_) => {
                            debug!("Closing handshake timed out");
                            closed_cleanly = false;
                        }
                    }
                }
                state.set(ConnectionState::Closed);
            }
        }

        let status = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.session = None;
            lifecycle.status.get()
        };

        info!(clean = closed_cleanly, "Disconnected");
        self.notify_state_changed(false, status);
        closed_cleanly
    }

    async fn claim_io(&self) -> IoSession<'_> {
        let ticket = self.gate.enter();
        let guard = self.io.lock().await;
        IoSession::new(guard, ticket)
    }

    fn is_connected(&self) -> bool {
        self.lifecycle
            .lock()
            .session
            .as_ref()
            .map(|s| s.state.is_open())
            .unwrap_or(false)
    }

    fn connection_status(&self) -> ConnectionState {
        self.lifecycle.lock().status.get()
    }

    fn heartbeat(&self) -> Option<String> {
        self.lifecycle
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.heartbeat.clone())
    }

    fn request_reconnect(&self) {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.shut_down || lifecycle.disconnect_requested {
            return;
        }
        self.scheduler.request(self.me.clone());
    }

    // ─────────────────────────────────────────────────────────────
    // Failure Handling
    // ─────────────────────────────────────────────────────────────

    /// Route a failure through the classifier
    fn handle_failure(&self, error: Error) {
        let disposition = classify(&error);
        if disposition.is_ignored() {
            debug!(error = %error, "Ignoring failure");
            return;
        }

        let is_connected = self.is_connected();
        let error = Arc::new(error);
        let listener = {
            let mut lifecycle = self.lifecycle.lock();
            if disposition.record {
                lifecycle.last_error = Some(error.clone());
                lifecycle.error_pending = true;
                if let Some(session) = lifecycle.session.as_mut() {
                    session.last_error = Some(error.clone());
                }
            }
            lifecycle.listener.clone()
        };

        warn!(
            code = %error.code(),
            connected = is_connected,
            retryable = error.is_retryable(),
            "{}",
            error
        );

        if disposition.notify_state && !is_connected {
            if let Some(listener) = &listener {
                listener.on_connection_state_changed(false, self.connection_status());
            }
        }
        if disposition.notify_closed {
            self.notify_connection_closed();
        }
        if disposition.notify_error {
            if let Some(listener) = &listener {
                listener.on_error(&error);
            }
        }
        if disposition.wants_reconnect(is_connected) {
            self.request_reconnect();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Listener Dispatch
    // ─────────────────────────────────────────────────────────────

    fn listener(&self) -> Option<Arc<dyn ClientListener>> {
        self.lifecycle.lock().listener.clone()
    }

    fn notify_response(&self, text: &str) {
        if let Some(listener) = self.listener() {
            listener.on_response_received(text);
        }
    }

    fn notify_state_changed(&self, is_connected: bool, status: ConnectionState) {
        if let Some(listener) = self.listener() {
            listener.on_connection_state_changed(is_connected, status);
        }
    }

    /// Report the loss of the current session, at most once
    fn notify_connection_closed(&self) {
        let (listener, params) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed_notified {
                return;
            }
            lifecycle.closed_notified = true;
            (lifecycle.listener.clone(), lifecycle.last_params.clone())
        };

        info!("Connection closed");
        if let (Some(listener), Some(params)) = (listener, params) {
            listener.on_connection_closed(&params.uri, params.heartbeat.as_deref(), params.timeout);
        }
    }
}

#[async_trait]
impl ReconnectTarget for Inner {
    async fn reconnect(&self) -> bool {
        let _transition = self.transitions.lock().await;
        if self.lifecycle.lock().disconnect_requested {
            debug!("Scheduled reconnect skipped: disconnect requested");
            return false;
        }
        self.reconnect_locked().await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(shutdown) = self.lifecycle.get_mut().loop_shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}
