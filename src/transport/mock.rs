//! Mock transport for testing
//!
//! Provides an in-memory [`Transport`] whose far end is driven by a
//! [`MockPeer`]. The peer can push frames, close or drop the connection,
//! answer sent commands through a responder, and inspect everything the
//! client sent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use url::Url;

use super::{ConnectionState, Connector, Frame, StateHandle, Transport};
use crate::client::Cookies;
use crate::error::{Error, Result, TransportErrorCode};

/// Computes the frames the peer sends back for a command
pub type Responder = Arc<dyn Fn(&str) -> Vec<Frame> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────
// Peer
// ─────────────────────────────────────────────────────────────────

struct PeerShared {
    state: StateHandle,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    sent: Mutex<Vec<String>>,
    sent_notify: Notify,
    responder: RwLock<Option<Responder>>,
    fail_sends: AtomicBool,
}

/// Far end of a [`MockTransport`]
#[derive(Clone)]
pub struct MockPeer {
    shared: Arc<PeerShared>,
}

impl MockPeer {
    /// Push one complete text message to the client
    pub fn push_text(&self, text: &str) {
        self.push_frame(Frame::data(text.as_bytes().to_vec(), true));
    }

    /// Push a message split into `parts` frames
    pub fn push_fragmented(&self, text: &str, parts: usize) {
        let bytes = text.as_bytes();
        let size = bytes.len().div_ceil(parts.max(1)).max(1);
        let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.push_frame(Frame::data(chunk.to_vec(), i == last));
        }
    }

    /// Push a raw frame
    pub fn push_frame(&self, frame: Frame) {
        let _ = self.shared.inbound_tx.send(frame);
    }

    /// Start a closing handshake from the peer side
    pub fn close(&self, code: u16, reason: &str) {
        self.push_frame(Frame::close(code, reason));
    }

    /// Drop the connection without a closing handshake
    pub fn drop_connection(&self) {
        self.shared.state.set(ConnectionState::Closed);
        self.shared.sent_notify.notify_waiters();
    }

    /// Make every subsequent send fail with a transport error
    pub fn fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Replace the responder
    pub fn set_responder(&self, responder: impl Fn(&str) -> Vec<Frame> + Send + Sync + 'static) {
        *self.shared.responder.write() = Some(Arc::new(responder));
    }

    /// Everything the client sent, in order
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// Number of messages the client sent
    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().len()
    }

    /// Native state of the transport
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Wait until at least `count` messages were sent
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.sent_notify.notified();
                if self.sent_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────

/// In-memory transport
pub struct MockTransport {
    shared: Arc<PeerShared>,
    inbound_rx: mpsc::UnboundedReceiver<Frame>,
    pending: Option<Frame>,
}

impl MockTransport {
    /// Create a connected transport and its peer
    pub fn pair() -> (Self, MockPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PeerShared {
            state: StateHandle::new(ConnectionState::Open),
            inbound_tx,
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            responder: RwLock::new(None),
            fail_sends: AtomicBool::new(false),
        });
        let transport = Self {
            shared: shared.clone(),
            inbound_rx,
            pending: None,
        };
        (transport, MockPeer { shared })
    }

    fn split(&mut self, mut frame: Frame, max_len: usize) -> Frame {
        let max_len = max_len.max(1);
        if frame.data.len() <= max_len {
            return frame;
        }
        let rest = frame.data.split_off(max_len);
        self.pending = Some(Frame {
            data: rest,
            end_of_message: frame.end_of_message,
            close: None,
        });
        frame.end_of_message = false;
        frame
    }

    fn ensure_open(&self) -> Result<()> {
        match self.shared.state.get() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => Err(Error::PeerClosedPrematurely {
                message: "mock connection dropped".to_string(),
            }),
            state => Err(Error::InvalidState {
                message: format!("mock transport is {}", state),
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn state(&self) -> StateHandle {
        self.shared.state.clone()
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport(TransportErrorCode::Io, "mock send failure"));
        }

        self.shared.sent.lock().push(text.to_string());
        let responder = self.shared.responder.read().clone();
        if let Some(responder) = responder {
            for frame in responder(text) {
                let _ = self.shared.inbound_tx.send(frame);
            }
        }
        self.shared.sent_notify.notify_waiters();
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(self.split(frame, max_len));
        }
        self.ensure_open()?;

        let frame = loop {
            let notified = self.shared.sent_notify.notified();
            tokio::select! {
                frame = self.inbound_rx.recv() => break frame,
                _ = notified => self.ensure_open()?,
            }
        };

        match frame {
            Some(frame) => {
                if frame.close.is_some() {
                    self.shared.state.set(ConnectionState::Closing);
                    return Ok(frame);
                }
                Ok(self.split(frame, max_len))
            }
            None => {
                self.shared.state.set(ConnectionState::Closed);
                Err(Error::PeerClosedPrematurely {
                    message: "mock peer went away".to_string(),
                })
            }
        }
    }

    async fn close(&mut self, _reason: &str) -> Result<()> {
        self.ensure_open()?;
        self.shared.state.set(ConnectionState::Closed);
        self.shared.sent_notify.notify_waiters();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ConnectorShared {
    peers: Mutex<Vec<MockPeer>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    delay: Mutex<Duration>,
    responder: RwLock<Option<Responder>>,
    last_uri: Mutex<Option<Url>>,
    last_cookies: Mutex<Option<Cookies>>,
    connected: Notify,
}

/// Connector producing [`MockTransport`]s
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<ConnectorShared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every connection attempt while set
    pub fn refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Delay every handshake
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.shared.delay.lock() = delay;
    }

    /// Responder installed on every new transport
    pub fn set_responder(&self, responder: impl Fn(&str) -> Vec<Frame> + Send + Sync + 'static) {
        *self.shared.responder.write() = Some(Arc::new(responder));
    }

    /// Number of connection attempts so far, refused ones included
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Peer of the most recent successful connection
    pub fn last_peer(&self) -> Option<MockPeer> {
        self.shared.peers.lock().last().cloned()
    }

    /// Peers of all successful connections
    pub fn peers(&self) -> Vec<MockPeer> {
        self.shared.peers.lock().clone()
    }

    /// URI of the most recent attempt
    pub fn last_uri(&self) -> Option<Url> {
        self.shared.last_uri.lock().clone()
    }

    /// Cookies presented by the most recent attempt
    pub fn last_cookies(&self) -> Option<Cookies> {
        self.shared.last_cookies.lock().clone()
    }

    /// Wait until at least `count` attempts were made
    pub async fn wait_for_connects(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.connected.notified();
                if self.connect_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, uri: &Url, cookies: &Cookies) -> Result<Box<dyn Transport>> {
        *self.shared.last_uri.lock() = Some(uri.clone());
        *self.shared.last_cookies.lock() = Some(cookies.clone());

        let delay = *self.shared.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.notify_waiters();

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(Error::connect_failed(uri.as_str(), "connection refused by mock"));
        }

        let (transport, peer) = MockTransport::pair();
        let responder = self.shared.responder.read().clone();
        if let Some(responder) = responder {
            *peer.shared.responder.write() = Some(responder);
        }
        self.shared.peers.lock().push(peer);
        Ok(Box::new(transport))
    }
}
