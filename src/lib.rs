//! eventlink - resilient duplex WebSocket client
//!
//! A long-lived WebSocket connection that pushes unsolicited server events to
//! a listener while still supporting request/response exchanges over the
//! same socket, with automatic reconnection.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod transport;
pub mod version;

pub use client::{
    ChannelListener, ClientConfig, ClientEvent, ClientListener, Cookies, DuplexClient,
    SessionInfo, NOT_CONNECTED,
};
pub use error::{Error, ErrorCode, Result};
pub use transport::ConnectionState;
