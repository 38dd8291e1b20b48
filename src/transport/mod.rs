//! Transport abstraction
//!
//! The client never talks to a socket library directly. It drives a
//! [`Transport`] obtained from a [`Connector`], which lets the WebSocket
//! implementation and the scriptable mock share the same client code.
//!
//! Framing is transport-driven: a message is complete when the transport
//! marks a [`Frame`] as `end_of_message`, never by inspecting the payload.

mod mock;
mod websocket;

pub use mock::{MockConnector, MockPeer, MockTransport};
pub use websocket::{map_ws_error, WsConnector, WsTransport};

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::client::Cookies;
use crate::error::Result;

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Native state of the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport has been created yet
    #[default]
    None = 0,
    /// Handshake in progress
    Connecting = 1,
    /// Ready for sending and receiving
    Open = 2,
    /// A closing handshake has been started by either side
    Closing = 3,
    /// The transport is closed
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Closing,
            4 => ConnectionState::Closed,
            _ => ConnectionState::None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared cell holding a transport's native state
///
/// The transport writes it as the socket changes state; the client reads it
/// without having to claim the transport itself.
#[derive(Debug, Clone, Default)]
pub struct StateHandle(Arc<AtomicU8>);

impl StateHandle {
    /// Create a handle starting in the given state
    pub fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    /// Current state
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the state
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}

// ─────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────

/// Close status sent by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    /// Close code (1000 = normal closure)
    pub code: u16,
    /// Human-readable reason
    pub reason: String,
}

/// A chunk of an inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes of this chunk
    pub data: Vec<u8>,
    /// Whether this chunk completes the current message
    pub end_of_message: bool,
    /// Set when the peer started the closing handshake
    pub close: Option<CloseStatus>,
}

impl Frame {
    /// A data chunk
    pub fn data(data: impl Into<Vec<u8>>, end_of_message: bool) -> Self {
        Self {
            data: data.into(),
            end_of_message,
            close: None,
        }
    }

    /// A close notification from the peer
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            end_of_message: true,
            close: Some(CloseStatus {
                code,
                reason: reason.into(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────

/// An established duplex connection
///
/// Implementations must keep `receive` cancel-safe: dropping the future before
/// it resolves must not lose data that has not been returned yet.
#[async_trait]
pub trait Transport: Send {
    /// Shared native state of this transport
    fn state(&self) -> StateHandle;

    /// Send one complete text message
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Receive the next chunk, at most `max_len` bytes of payload
    async fn receive(&mut self, max_len: usize) -> Result<Frame>;

    /// Start and complete a normal closing handshake
    async fn close(&mut self, reason: &str) -> Result<()>;
}

/// Factory for transports
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to `uri`, presenting `cookies` during the handshake
    async fn connect(&self, uri: &Url, cookies: &Cookies) -> Result<Box<dyn Transport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_handle_shared() {
        let handle = StateHandle::new(ConnectionState::Connecting);
        let clone = handle.clone();
        assert_eq!(clone.get(), ConnectionState::Connecting);
        assert!(!clone.is_open());

        handle.set(ConnectionState::Open);
        assert!(clone.is_open());

        clone.set(ConnectionState::Closed);
        assert_eq!(handle.get(), ConnectionState::Closed);
    }

    #[test]
    fn test_state_default_is_none() {
        assert_eq!(StateHandle::default().get(), ConnectionState::None);
        assert_eq!(ConnectionState::default(), ConnectionState::None);
    }

    #[test]
    fn test_close_frame_ends_message() {
        let frame = Frame::close(1000, "bye");
        assert!(frame.end_of_message);
        assert!(frame.data.is_empty());
        assert_eq!(frame.close.unwrap().code, 1000);
    }
}
