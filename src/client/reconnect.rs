//! Debounced reconnect scheduling
//!
//! Several failure paths can detect the same outage at once (a send timeout
//! in an exchange and a close frame seen by the receive loop, say). The
//! scheduler collapses them into a single delayed reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something that can re-establish its connection
#[async_trait]
pub trait ReconnectTarget: Send + Sync + 'static {
    /// Reconnect with the last-used parameters
    async fn reconnect(&self) -> bool;
}

/// Single-shot reconnect timer with an Idle/Armed state
pub struct ReconnectScheduler {
    enabled: bool,
    delay: Duration,
    armed: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectScheduler {
    pub fn new(enabled: bool, delay: Duration) -> Self {
        Self {
            enabled,
            delay,
            armed: Arc::new(AtomicBool::new(false)),
            timer: Mutex::new(None),
        }
    }

    /// Whether a reconnect is pending
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Arm the timer unless disabled or already armed
    ///
    /// Returns `true` if this call armed the timer. Must be called from within
    /// a tokio runtime.
    pub fn request<T: ReconnectTarget>(&self, target: Weak<T>) -> bool {
        if !self.enabled {
            return false;
        }

        let mut timer = self.timer.lock();
        if self.armed.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending");
            return false;
        }

        let armed = self.armed.clone();
        let delay = self.delay;
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            armed.store(false, Ordering::SeqCst);

            let Some(target) = target.upgrade() else {
                debug!("Reconnect target dropped before the timer fired");
                return;
            };
            // Detached so that cancelling the timer never interrupts a handshake
            tokio::spawn(async move {
                let connected = target.reconnect().await;
                debug!(connected, "Scheduled reconnect finished");
            });
        }));
        true
    }

    /// Disarm and drop a pending timer
    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
