//! Request/response exchanges over the shared transport
//!
//! Every call claims the transport through the I/O gate, which interrupts
//! the receive loop between messages, and releases it before any listener
//! runs.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::framing::{bound, millis, read_message, send_command, Inbound};
use super::{Inner, NOT_CONNECTED};
use crate::error::{Error, Result};
use crate::transport::CloseStatus;

/// Result of reading until a pattern matches
enum MatchOutcome {
    Matched(String),
    Expired,
    Closed(CloseStatus),
    Disconnected,
}

impl Inner {
    pub(crate) async fn exchange(&self, command: &str, buffer_size: usize, timeout: Duration) -> String {
        let mut io = self.claim_io().await;
        if !self.is_connected() {
            return NOT_CONNECTED.to_string();
        }
        let Some(transport) = io.transport() else {
            return NOT_CONNECTED.to_string();
        };

        let buffer_size = if buffer_size == 0 {
            self.config.buffer_size
        } else {
            buffer_size
        };
        let limit = bound(timeout);

        let outcome = async {
            send_command(transport, command, limit).await?;
            read_message(transport, buffer_size, limit).await
        }
        .await;
        drop(io);

        match outcome {
            Ok(Inbound::Message(text)) => {
                self.notify_response(&text);
                text
            }
            Ok(Inbound::Closed(status)) => {
                self.peer_closed_during_exchange(status);
                String::new()
            }
            Err(error) => {
                self.handle_failure(error);
                String::new()
            }
        }
    }

    pub(crate) async fn exchange_until_match(
        &self,
        command: &str,
        pattern: &Regex,
        timeout: Duration,
    ) -> String {
        let mut io = self.claim_io().await;
        if !self.is_connected() {
            return NOT_CONNECTED.to_string();
        }
        let Some(transport) = io.transport() else {
            return NOT_CONNECTED.to_string();
        };

        let limit = bound(timeout);
        let started = Instant::now();
        let buffer_size = self.config.buffer_size;
        let mut received: Vec<String> = Vec::new();

        let outcome: Result<MatchOutcome> = async {
            send_command(transport, command, limit).await?;
            loop {
                let remaining = match limit {
                    Some(limit) => match limit.checked_sub(started.elapsed()) {
                        Some(left) if !left.is_zero() => Some(left),
                        _ => return Ok(MatchOutcome::Expired),
                    },
                    None => None,
                };

                match read_message(transport, buffer_size, remaining).await {
                    Ok(Inbound::Message(text)) => {
                        let matched = pattern.is_match(&text);
                        received.push(text);
                        if matched {
                            let text = received.last().cloned().unwrap_or_default();
                            return Ok(MatchOutcome::Matched(text));
                        }
                    }
                    Ok(Inbound::Closed(status)) => return Ok(MatchOutcome::Closed(status)),
                    Err(Error::ReceiveTimeout { .. }) if limit.is_some() => {
                        return Ok(MatchOutcome::Expired)
                    }
                    Err(e) => return Err(e),
                }

                if !transport.state().is_open() {
                    return Ok(MatchOutcome::Disconnected);
                }
            }
        }
        .await;
        drop(io);

        for text in &received {
            self.notify_response(text);
        }

        let expired = |this: &Self| {
            this.handle_failure(Error::RegexMatchTimeout {
                pattern: pattern.as_str().to_string(),
                received: received.concat(),
                timeout_ms: millis(timeout),
            });
            String::new()
        };

        match outcome {
            Ok(MatchOutcome::Matched(text)) => text,
            Ok(MatchOutcome::Expired) | Ok(MatchOutcome::Disconnected) => expired(self),
            Ok(MatchOutcome::Closed(status)) => {
                let reply = expired(self);
                self.peer_closed_during_exchange(status);
                reply
            }
            Err(error) => {
                self.handle_failure(error);
                String::new()
            }
        }
    }

    /// One read without sending; a timeout only means nothing was waiting
    pub(crate) async fn drain(&self, buffer_size: usize, timeout: Duration) -> String {
        let mut io = self.claim_io().await;
        if !self.is_connected() {
            return NOT_CONNECTED.to_string();
        }
        let Some(transport) = io.transport() else {
            return NOT_CONNECTED.to_string();
        };

        let buffer_size = if buffer_size == 0 {
            self.config.buffer_size
        } else {
            buffer_size
        };
        let outcome = read_message(transport, buffer_size, bound(timeout)).await;
        drop(io);

        match outcome {
            Ok(Inbound::Message(text)) => {
                self.notify_response(&text);
                text
            }
            Ok(Inbound::Closed(status)) => {
                self.peer_closed_during_exchange(status);
                String::new()
            }
            Err(error) if error.is_timeout() => {
                debug!(error = %error, "Nothing to drain");
                String::new()
            }
            Err(error) => {
                self.handle_failure(error);
                String::new()
            }
        }
    }

    /// The peer started closing while a caller held the transport
    ///
    /// Connection-closed is left to the receive loop, which observes the
    /// closed transport on its next iteration.
    fn peer_closed_during_exchange(&self, status: CloseStatus) {
        info!(code = status.code, reason = %status.reason, "Peer closed the connection");
        self.notify_state_changed(false, self.connection_status());
        if !self.config.receive_loop_enabled() {
            self.notify_connection_closed();
        }
        self.request_reconnect();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use regex::Regex;

    use crate::client::{ClientConfig, ClientEvent, DuplexClient, NOT_CONNECTED};
    use crate::error::Error;
    use crate::transport::{Frame, MockConnector};

    fn quiet_client() -> (DuplexClient, MockConnector) {
        let connector = MockConnector::new();
        let client = DuplexClient::with_connector(
            ClientConfig {
                auto_receive_interval: Duration::ZERO,
                ..ClientConfig::default()
            },
            Arc::new(connector.clone()),
        );
        (client, connector)
    }

    fn echo(command: &str) -> Vec<Frame> {
        vec![Frame::data(format!("echo:{}", command).into_bytes(), true)]
    }

    #[tokio::test]
    async fn test_not_connected_returns_sentinel() {
        let (client, _connector) = quiet_client();
        assert_eq!(client.exchange("hi", 0, Duration::from_millis(10)).await, NOT_CONNECTED);
        assert_eq!(client.drain().await, NOT_CONNECTED);

        let pattern = Regex::new("x").unwrap();
        assert_eq!(
            client.exchange_until_match("hi", &pattern, Duration::from_millis(10)).await,
            NOT_CONNECTED
        );
    }

    #[tokio::test]
    async fn test_exchange_echo() {
        let (client, connector) = quiet_client();
        connector.set_responder(echo);
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;

        let reply = client.exchange("status", 0, Duration::from_secs(1)).await;
        assert_eq!(reply, "echo:status");
        assert_eq!(connector.last_peer().unwrap().sent(), vec!["status".to_string()]);
    }

    #[tokio::test]
    async fn test_exchange_publishes_reply() {
        let (client, connector) = quiet_client();
        connector.set_responder(echo);
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;
        let mut events = client.subscribe();

        client.exchange("ping", 0, Duration::from_secs(1)).await;
        assert_eq!(events.recv().await, Some(ClientEvent::Response("echo:ping".into())));
    }

    #[tokio::test]
    async fn test_exchange_silent_peer_times_out() {
        let (client, _connector) = quiet_client();
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;

        let start = tokio::time::Instant::now();
        let reply = client.exchange("hello", 0, Duration::from_millis(50)).await;
        assert_eq!(reply, "");
        assert!(start.elapsed() < Duration::from_millis(150));
        // Operation timeouts are not recorded
        assert!(!client.has_pending_error());
    }

    #[tokio::test]
    async fn test_exchange_send_failure_is_recorded() {
        let (client, connector) = quiet_client();
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;
        connector.last_peer().unwrap().fail_sends(true);

        assert_eq!(client.exchange("x", 0, Duration::from_millis(50)).await, "");
        let err = client.last_error().unwrap();
        assert!(matches!(*err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn test_until_match_skips_unrelated_messages() {
        let (client, connector) = quiet_client();
        connector.set_responder(|_| {
            vec![
                Frame::data(b"progress 10%".to_vec(), true),
                Frame::data(b"progress 90%".to_vec(), true),
                Frame::data(b"done: ok".to_vec(), true),
            ]
        });
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;

        let pattern = Regex::new(r"^done").unwrap();
        let reply = client
            .exchange_until_match("run", &pattern, Duration::from_secs(1))
            .await;
        assert_eq!(reply, "done: ok");
    }

    #[tokio::test]
    async fn test_until_match_deadline() {
        let (client, connector) = quiet_client();
        connector.set_responder(|_| vec![Frame::data(b"nope".to_vec(), true)]);
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;

        let pattern = Regex::new("never").unwrap();
        let start = tokio::time::Instant::now();
        let reply = client
            .exchange_until_match("run", &pattern, Duration::from_millis(100))
            .await;

        assert_eq!(reply, "");
        assert!(start.elapsed() < Duration::from_millis(250));
        match client.last_error().as_deref() {
            Some(Error::RegexMatchTimeout { received, .. }) => assert_eq!(received, "nope"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!client.is_reconnect_pending());
    }

    #[tokio::test]
    async fn test_drain_reads_pending_message() {
        let (client, connector) = quiet_client();
        client.connect("ws://mock/feed", None, Duration::ZERO).await;
        connector.last_peer().unwrap().push_text("backlog");

        assert_eq!(client.drain_with(0, Duration::from_millis(100)).await, "backlog");
        assert_eq!(client.drain_with(0, Duration::from_millis(20)).await, "");
        assert!(!client.has_pending_error());
    }

    #[tokio::test]
    async fn test_peer_close_during_exchange() {
        let (client, connector) = quiet_client();
        connector.set_responder(|_| vec![Frame::close(1000, "bye")]);
        client.connect("ws://mock/cmd", None, Duration::ZERO).await;
        let mut events = client.subscribe();

        assert_eq!(client.exchange("x", 0, Duration::from_secs(1)).await, "");
        assert!(!client.is_connected());

        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ClientEvent::ConnectionClosed { .. }) {
                saw_closed = true;
            }
        }
        assert!(saw_closed);
    }
}
