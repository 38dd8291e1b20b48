//! Background receive loop
//!
//! One loop runs per session. Each iteration optionally sends the heartbeat,
//! then waits up to the receive interval for one complete message and hands
//! it to the listener. The loop yields the transport to any exchange that
//! announces itself on the I/O gate and stops when the shutdown signal
//! flips, the connection is lost, or the client is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::framing::{bound, read_message_interruptible, send_command, Inbound};
use super::Inner;
use crate::error::Error;

/// What one iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// A message was handed to the listener
    Delivered,
    /// Nothing arrived, or a recoverable step timed out
    Idle,
    /// The transport is claimed by a caller
    Yielded,
    /// The loop must stop
    Exit,
}

/// Drive ticks until one says stop; `exited` is raised on every way out
pub(crate) async fn run(
    client: Weak<Inner>,
    mut shutdown: watch::Receiver<bool>,
    exited: Arc<AtomicBool>,
) {
    debug!("Receive loop started");
    let mut delivered: u64 = 0;

    loop {
        let Some(inner) = client.upgrade() else {
            break;
        };

        match inner.tick(&mut shutdown).await {
            Step::Delivered => delivered += 1,
            Step::Idle => {}
            Step::Yielded => {
                tokio::select! {
                    _ = inner.gate.idle() => {}
                    _ = shutdown.changed() => {}
                }
            }
            Step::Exit => break,
        }
    }

    exited.store(true, Ordering::SeqCst);
    debug!(delivered, "Receive loop stopped");
}

impl Inner {
    /// Run one loop iteration
    pub(crate) async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> Step {
        if *shutdown.borrow() {
            return Step::Exit;
        }
        if self.gate.is_requested() {
            return Step::Yielded;
        }
        let Ok(mut slot) = self.io.try_lock() else {
            return Step::Yielded;
        };

        let transport = match slot.as_deref_mut() {
            Some(transport) if transport.state().is_open() => transport,
            _ => {
                drop(slot);
                self.notify_connection_closed();
                self.request_reconnect();
                return Step::Exit;
            }
        };

        let limit = bound(self.config.auto_receive_interval);
        if let Some(heartbeat) = self.heartbeat() {
            trace!("Sending heartbeat");
            match send_command(transport, &heartbeat, limit).await {
                Ok(()) => {}
                Err(error) if error.is_timeout() => {
                    debug!(error = %error, "Heartbeat send timed out");
                    return Step::Idle;
                }
                Err(error) => {
                    drop(slot);
                    return self.loop_failure(error);
                }
            }
        }

        let interrupt = async {
            tokio::select! {
                _ = self.gate.requested() => {}
                _ = shutdown.changed() => {}
            }
        };
        let outcome =
            read_message_interruptible(transport, self.config.buffer_size, limit, interrupt).await;
        drop(slot);

        match outcome {
            Ok(Some(Inbound::Message(text))) => {
                self.notify_response(&text);
                Step::Delivered
            }
            Ok(Some(Inbound::Closed(status))) => {
                info!(code = status.code, reason = %status.reason, "Peer closed the connection");
                self.notify_state_changed(false, self.connection_status());
                self.notify_connection_closed();
                self.request_reconnect();
                Step::Exit
            }
            Ok(None) => Step::Idle,
            Err(Error::ReceiveTimeout { timeout_ms }) => {
                debug!(timeout_ms, "Message incomplete at end of interval; dropped");
                Step::Idle
            }
            Err(error) => self.loop_failure(error),
        }
    }

    fn loop_failure(&self, error: Error) -> Step {
        if matches!(error, Error::Shutdown) {
            return Step::Exit;
        }
        self.handle_failure(error);
        if self.is_connected() {
            Step::Idle
        } else {
            Step::Exit
        }
    }
}
