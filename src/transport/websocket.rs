//! WebSocket transport built on tokio-tungstenite
//!
//! tungstenite reassembles fragmented frames into whole messages. To keep
//! framing transport-signalled at the client level, each inbound message is
//! handed out in chunks of at most the caller's buffer size, with the last
//! chunk carrying the end-of-message marker.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use super::{ConnectionState, Connector, Frame, StateHandle, Transport};
use crate::client::Cookies;
use crate::error::{Error, Result, TransportErrorCode};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────

/// Opens tokio-tungstenite connections
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, uri: &Url, cookies: &Cookies) -> Result<Box<dyn Transport>> {
        let mut request = uri
            .as_str()
            .into_client_request()
            .map_err(|e| Error::connect_failed(uri.as_str(), e.to_string()))?;

        if let Some(cookie) = cookies.header_value() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| Error::connect_failed(uri.as_str(), format!("invalid cookie header: {}", e)))?;
            request.headers_mut().insert(COOKIE, value);
        }

        debug!(uri = %uri, cookies = cookies.len(), "Opening WebSocket");
        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::connect_failed(uri.as_str(), e.to_string()))?;
        debug!(uri = %uri, status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsTransport::new(stream)))
    }
}

// ─────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────

/// An open tokio-tungstenite connection
pub struct WsTransport {
    stream: WsStream,
    state: StateHandle,
    /// Remainder of the message currently being handed out in chunks
    pending: Option<PendingMessage>,
}

struct PendingMessage {
    data: Vec<u8>,
    offset: usize,
}

impl WsTransport {
    fn new(stream: WsStream) -> Self {
        Self {
            stream,
            state: StateHandle::new(ConnectionState::Open),
            pending: None,
        }
    }

    fn next_chunk(&mut self, max_len: usize) -> Option<Frame> {
        let pending = self.pending.as_mut()?;
        let end = (pending.offset + max_len.max(1)).min(pending.data.len());
        let chunk = pending.data[pending.offset..end].to_vec();
        pending.offset = end;

        let done = pending.offset >= pending.data.len();
        if done {
            self.pending = None;
        }
        Some(Frame::data(chunk, done))
    }

    fn fail(&self, error: WsError) -> Error {
        let mapped = map_ws_error(error);
        if matches!(
            mapped,
            Error::PeerClosedPrematurely { .. } | Error::InvalidState { .. }
        ) || matches!(mapped, Error::Transport { code: TransportErrorCode::Io, .. })
        {
            self.state.set(ConnectionState::Closed);
        }
        mapped
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn state(&self) -> StateHandle {
        self.state.clone()
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        trace!(len = text.len(), "Sending text message");
        self.stream
            .send(WsMessage::Text(text.to_owned()))
            .await
            .map_err(|e| self.fail(e))
    }

    async fn receive(&mut self, max_len: usize) -> Result<Frame> {
        if let Some(frame) = self.next_chunk(max_len) {
            return Ok(frame);
        }

        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(self.fail(e)),
                None => {
                    self.state.set(ConnectionState::Closed);
                    return Err(Error::PeerClosedPrematurely {
                        message: "stream ended".to_string(),
                    });
                }
            };

            let data = match message {
                WsMessage::Text(text) => text.into_bytes(),
                WsMessage::Binary(data) => data,
                WsMessage::Close(frame) => {
                    self.state.set(ConnectionState::Closing);
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((u16::from(CloseCode::Status), String::new()));
                    debug!(code, reason = %reason, "Peer started closing handshake");
                    return Ok(Frame::close(code, reason));
                }
                // tungstenite answers pings on the next read or write
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            };

            if data.is_empty() {
                return Ok(Frame::data(Vec::new(), true));
            }
            self.pending = Some(PendingMessage { data, offset: 0 });
            if let Some(frame) = self.next_chunk(max_len) {
                return Ok(frame);
            }
        }
    }

    async fn close(&mut self, reason: &str) -> Result<()> {
        if self.state.get() != ConnectionState::Open {
            return Err(Error::InvalidState {
                message: format!("cannot close a transport that is {}", self.state.get()),
            });
        }
        self.state.set(ConnectionState::Closing);
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.into(),
        };
        let result = self.stream.close(Some(frame)).await;
        self.state.set(ConnectionState::Closed);
        match result {
            Ok(()) | Err(WsError::ConnectionClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

/// Map a tungstenite error onto the client's failure taxonomy
pub fn map_ws_error(error: WsError) -> Error {
    match error {
        WsError::ConnectionClosed => Error::StaleConnection {
            state: ConnectionState::Closed.to_string(),
        },
        WsError::AlreadyClosed => Error::InvalidState {
            message: "connection already closed".to_string(),
        },
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            Error::PeerClosedPrematurely {
                message: "connection reset without closing handshake".to_string(),
            }
        }
        WsError::Protocol(ProtocolError::SendAfterClosing)
        | WsError::Protocol(ProtocolError::ReceivedAfterClosing) => Error::InvalidState {
            message: "operation after closing handshake".to_string(),
        },
        WsError::Io(e) => match e.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => Error::PeerClosedPrematurely {
                message: e.to_string(),
            },
            _ => Error::transport(TransportErrorCode::Io, e.to_string()),
        },
        WsError::Protocol(e) => Error::transport(TransportErrorCode::Protocol, e.to_string()),
        WsError::Capacity(e) => Error::transport(TransportErrorCode::Capacity, e.to_string()),
        WsError::Tls(e) => Error::transport(TransportErrorCode::Tls, e.to_string()),
        WsError::Utf8 => Error::transport(TransportErrorCode::Utf8, "invalid UTF-8 in text frame"),
        WsError::WriteBufferFull(_) => {
            Error::transport(TransportErrorCode::SendQueueFull, "write buffer is full")
        }
        WsError::Http(response) => Error::transport(
            TransportErrorCode::Http,
            format!("upgrade rejected with status {}", response.status()),
        ),
        other => Error::transport(TransportErrorCode::Other, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_reset_is_premature_close() {
        let err = map_ws_error(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake));
        assert!(matches!(err, Error::PeerClosedPrematurely { .. }));
    }

    #[test]
    fn test_map_closed_states() {
        assert!(matches!(
            map_ws_error(WsError::ConnectionClosed),
            Error::StaleConnection { .. }
        ));
        assert!(matches!(
            map_ws_error(WsError::AlreadyClosed),
            Error::InvalidState { .. }
        ));
    }

    #[test]
    fn test_map_io_errors() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            map_ws_error(WsError::Io(reset)),
            Error::PeerClosedPrematurely { .. }
        ));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        assert!(matches!(
            map_ws_error(WsError::Io(other)),
            Error::Transport { code: TransportErrorCode::Io, .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_failure() {
        // Port 9 (discard) is closed on test machines
        let uri = Url::parse("ws://127.0.0.1:9/").unwrap();
        let result = WsConnector::new().connect(&uri, &Cookies::default()).await;
        assert!(matches!(result, Err(Error::ConnectFailed { .. })));
    }
}
