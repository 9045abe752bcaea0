//! Start/stop control for a long-lived tick loop, used by the admin
//! endpoints that toggle the Lifecycle Processor, Lot Generator, and
//! Telemetry Simulator at runtime.

use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

pub struct BackgroundTask {
    handle: Mutex<Option<Handle>>,
}

impl Default for BackgroundTask {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTask {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Start the loop if not already running, spawning `spawn(token)` as the
    /// background task. Returns `false` if already running (a no-op).
    pub fn start<F>(&self, spawn: F) -> bool
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        let join = spawn(token.clone());
        *guard = Some(Handle { token, join });
        true
    }

    /// Signal cancellation and drop the handle; does not await completion to
    /// keep the HTTP request fast.
    pub fn stop(&self) -> bool {
        let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            Some(h) => {
                h.token.cancel();
                drop(h.join);
                true
            }
            None => false,
        }
    }
}
