//! Common test utilities and fixtures
//!
//! Provides config fixtures and an in-process WebSocket server built on
//! tokio-tungstenite.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

// ─────────────────────────────────────────────────────────────────
// Mock Server
// ─────────────────────────────────────────────────────────────────

/// How the server treats each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Answer every text message with `echo:<text>`
    Echo,
    /// Record messages, never answer
    Silent,
    /// First connection: send `{"type":"A"}` then close. Later ones echo.
    GreetAndClose,
}

struct ServerState {
    mode: ServerMode,
    connections: AtomicUsize,
    connected_at: RwLock<Vec<Instant>>,
    messages: RwLock<Vec<String>>,
    cookies: RwLock<Vec<Option<String>>>,
    push_tx: broadcast::Sender<String>,
}

/// WebSocket server on a random local port
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl MockServer {
    pub async fn start(mode: ServerMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (push_tx, _) = broadcast::channel(64);

        let state = Arc::new(ServerState {
            mode,
            connections: AtomicUsize::new(0),
            connected_at: RwLock::new(Vec::new()),
            messages: RwLock::new(Vec::new()),
            cookies: RwLock::new(Vec::new()),
            push_tx,
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            let state = server_state.clone();
                            tokio::spawn(async move { accept(stream, state).await });
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/events", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn connected_at(&self) -> Vec<Instant> {
        self.state.connected_at.read().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state.messages.read().clone()
    }

    /// Cookie header of every handshake, in order
    pub fn cookies(&self) -> Vec<Option<String>> {
        self.state.cookies.read().clone()
    }

    /// Send an unsolicited message to every open connection
    pub fn push(&self, text: &str) {
        let _ = self.state.push_tx.send(text.to_string());
    }

    /// Poll until `check` holds or `timeout` elapses
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check(self)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn accept(stream: TcpStream, state: Arc<ServerState>) {
    let cookie_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let cookie = request
            .headers()
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        cookie_state.cookies.write().push(cookie);
        Ok(response)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let index = state.connections.fetch_add(1, Ordering::SeqCst);
    state.connected_at.write().push(Instant::now());

    if state.mode == ServerMode::GreetAndClose && index == 0 {
        greet_and_close(ws).await;
    } else {
        serve(ws, state).await;
    }
}

async fn greet_and_close(ws: WebSocketStream<TcpStream>) {
    let (mut write, mut read) = ws.split();
    let _ = write.send(WsMessage::Text(r#"{"type":"A"}"#.to_string())).await;
    let _ = write
        .send(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        })))
        .await;
    // Finish the closing handshake
    while let Some(Ok(_)) = read.next().await {}
}

async fn serve(ws: WebSocketStream<TcpStream>, state: Arc<ServerState>) {
    let (mut write, mut read) = ws.split();
    let mut pushes = state.push_tx.subscribe();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    state.messages.write().push(text.clone());
                    if state.mode != ServerMode::Silent {
                        let _ = write.send(WsMessage::Text(format!("echo:{}", text))).await;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            pushed = pushes.recv() => {
                if let Ok(text) = pushed {
                    let _ = write.send(WsMessage::Text(text)).await;
                }
            }
        }
    }
}
