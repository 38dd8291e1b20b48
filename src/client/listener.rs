//! Client event listeners
//!
//! A single [`ClientListener`] slot receives every event kind. Methods have
//! empty default bodies so a subscriber only implements what it needs.
//! Listeners are invoked synchronously from the client's tasks and must not
//! block; [`ChannelListener`] forwards events to an async consumer instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::transport::ConnectionState;

/// Receives client events
pub trait ClientListener: Send + Sync {
    /// A complete inbound message was received
    fn on_response_received(&self, _text: &str) {}

    /// The connection was lost; carries the parameters needed to reconnect
    fn on_connection_closed(&self, _uri: &str, _heartbeat: Option<&str>, _timeout: Duration) {}

    /// The connection status changed
    fn on_connection_state_changed(&self, _is_connected: bool, _status: ConnectionState) {}

    /// An error was recorded
    fn on_error(&self, _error: &Error) {}
}

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A complete inbound message
    Response(String),

    /// Connection lost
    ConnectionClosed {
        uri: String,
        heartbeat: Option<String>,
        timeout: Duration,
    },

    /// Connection status changed
    StateChanged {
        is_connected: bool,
        status: ConnectionState,
    },

    /// Error recorded, rendered with its code
    Error(String),
}

/// Listener forwarding every event into an unbounded channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelListener {
    /// Create the listener and the receiving end of its channel
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn emit(&self, event: ClientEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl ClientListener for ChannelListener {
    fn on_response_received(&self, text: &str) {
        self.emit(ClientEvent::Response(text.to_string()));
    }

    fn on_connection_closed(&self, uri: &str, heartbeat: Option<&str>, timeout: Duration) {
        self.emit(ClientEvent::ConnectionClosed {
            uri: uri.to_string(),
            heartbeat: heartbeat.map(str::to_string),
            timeout,
        });
    }

    fn on_connection_state_changed(&self, is_connected: bool, status: ConnectionState) {
        self.emit(ClientEvent::StateChanged {
            is_connected,
            status,
        });
    }

    fn on_error(&self, error: &Error) {
        self.emit(ClientEvent::Error(error.format_for_log()));
    }
}
