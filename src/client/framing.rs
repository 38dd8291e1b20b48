//! Bounded send and message assembly over a [`Transport`]

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{CloseStatus, Frame, Transport};

/// Outcome of reading one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// A complete message, decoded as UTF-8 with replacement of invalid bytes
    Message(String),
    /// The peer started the closing handshake; any partial message is dropped
    Closed(CloseStatus),
}

/// Zero means unbounded
pub(crate) fn bound(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Send one text message within `limit`
pub(crate) async fn send_command(
    transport: &mut dyn Transport,
    command: &str,
    limit: Option<Duration>,
) -> Result<()> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, transport.send_text(command))
            .await
            .map_err(|_| Error::SendTimeout {
                timeout_ms: millis(limit),
            })?,
        None => transport.send_text(command).await,
    }
}

/// Read one complete message within `limit`
pub(crate) async fn read_message(
    transport: &mut dyn Transport,
    buffer_size: usize,
    limit: Option<Duration>,
) -> Result<Inbound> {
    within(limit, assemble(transport, buffer_size, None)).await
}

/// Read one message, giving up quietly before the first frame arrives
///
/// Returns `Ok(None)` when `interrupt` resolves or `limit` elapses while
/// nothing has been received. Once a message has started, the rest of it is
/// read within what remains of `limit`.
pub(crate) async fn read_message_interruptible<F>(
    transport: &mut dyn Transport,
    buffer_size: usize,
    limit: Option<Duration>,
    interrupt: F,
) -> Result<Option<Inbound>>
where
    F: Future<Output = ()>,
{
    let started = tokio::time::Instant::now();

    let first = tokio::select! {
        biased;
        _ = interrupt => return Ok(None),
        frame = within(limit, transport.receive(buffer_size)) => match frame {
            Ok(frame) => frame,
            Err(Error::ReceiveTimeout { .. }) => return Ok(None),
            Err(e) => return Err(e),
        },
    };

    let remaining = limit.map(|l| l.saturating_sub(started.elapsed()).max(Duration::from_millis(1)));
    within(remaining, assemble(transport, buffer_size, Some(first)))
        .await
        .map(Some)
}

async fn within<T, F>(limit: Option<Duration>, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| Error::ReceiveTimeout {
                timeout_ms: millis(limit),
            })?,
        None => operation.await,
    }
}

async fn assemble(
    transport: &mut dyn Transport,
    buffer_size: usize,
    first: Option<Frame>,
) -> Result<Inbound> {
    let mut buffer = Vec::new();
    let mut next = first;

    loop {
        let frame = match next.take() {
            Some(frame) => frame,
            None => transport.receive(buffer_size).await?,
        };

        if let Some(status) = frame.close {
            return Ok(Inbound::Closed(status));
        }

        buffer.extend_from_slice(&frame.data);
        if frame.end_of_message {
            return Ok(Inbound::Message(String::from_utf8_lossy(&buffer).into_owned()));
        }
    }
}
