//! Transport ownership
//!
//! The transport lives behind one async mutex. Callers queue on it in FIFO
//! order; the receive loop only ever `try_lock`s and backs off whenever a
//! caller has announced itself through the [`IoGate`].

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{MutexGuard, Notify};

use crate::transport::Transport;

/// Slot holding the transport of the current session
pub(crate) type TransportSlot = Option<Box<dyn Transport>>;

/// Count of callers waiting for or holding the transport
#[derive(Default)]
pub(crate) struct IoGate {
    pending: AtomicUsize,
    changed: Notify,
}

impl IoGate {
    /// Announce a caller
    pub fn enter(&self) -> GateTicket<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
        GateTicket { gate: self }
    }

    pub fn is_requested(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Resolve once at least one caller is announced
    pub async fn requested(&self) {
        loop {
            let notified = self.changed.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Resolve once no caller is announced
    pub async fn idle(&self) {
        loop {
            let notified = self.changed.notified();
            if !self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a caller announced until dropped
pub(crate) struct GateTicket<'a> {
    gate: &'a IoGate,
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        self.gate.pending.fetch_sub(1, Ordering::SeqCst);
        self.gate.changed.notify_waiters();
    }
}

/// Exclusive access to the transport slot
///
/// Fields drop in declaration order, so the lock is released before the
/// caller stops being announced and the loop never sees a free gate while
/// the lock is still held.
pub(crate) struct IoSession<'a> {
    guard: MutexGuard<'a, TransportSlot>,
    _ticket: GateTicket<'a>,
}

impl<'a> IoSession<'a> {
    pub fn new(guard: MutexGuard<'a, TransportSlot>, ticket: GateTicket<'a>) -> Self {
        Self {
            guard,
            _ticket: ticket,
        }
    }

    /// The transport, if one is installed
    pub fn transport(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.guard.as_deref_mut()
    }

    pub fn install(&mut self, transport: Box<dyn Transport>) -> TransportSlot {
        self.guard.replace(transport)
    }

    pub fn take(&mut self) -> TransportSlot {
        self.guard.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ticket_lifecycle() {
        let gate = IoGate::default();
        assert!(!gate.is_requested());

        let first = gate.enter();
        let second = gate.enter();
        assert!(gate.is_requested());

        drop(first);
        assert!(gate.is_requested());
        drop(second);
        assert!(!gate.is_requested());
    }

    #[tokio::test]
    async fn test_requested_wakes_waiter() {
        let gate = Arc::new(IoGate::default());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.requested().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ticket = gate.enter();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_wakes_after_release() {
        let gate = Arc::new(IoGate::default());
        let ticket = gate.enter();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(ticket);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
