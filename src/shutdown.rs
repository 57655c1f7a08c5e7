//! Shutdown coordination for in-flight relay sessions.
//!
//! The listener tracks every live session with an RAII guard; shutdown
//! flips the tracker to draining (no new sessions) and waits for the
//! live count to reach zero, up to a timeout.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

const STATE_RUNNING: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Result of a drain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Tracks live relay sessions and coordinates drain on shutdown.
pub struct SessionTracker {
    state: AtomicU8,
    live: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_RUNNING),
            live: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Whether new sessions may start.
    pub fn is_accepting(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    /// Register a new live session. Returns `None` once draining.
    pub fn track(&self) -> Option<SessionGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(SessionGuard {
            live: self.live.clone(),
            notify: self.notify.clone(),
        })
    }

    /// Current number of live sessions.
    pub fn live_count(&self) -> u32 {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop admitting sessions and wait for live ones to finish.
    pub async fn drain(&self, timeout: Duration) -> DrainResult {
        self.state.store(STATE_DRAINING, Ordering::SeqCst);
        let result = self.wait_for_drain(timeout).await;
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> DrainResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let count = self.live_count();
            if count == 0 {
                return DrainResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return DrainResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.live_count();
                    if final_count == 0 {
                        return DrainResult::Complete;
                    }
                    return DrainResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one live session.
pub struct SessionGuard {
    live: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}
