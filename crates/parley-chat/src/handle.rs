//! A cloneable handle for stopping a generation from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for stopping the active generation.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct ChatHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) is_streaming: Arc<AtomicBool>,
}

impl Default for ChatHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop the current generation.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a generation is currently streaming.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Acquire)
    }

    /// Token for the next generation, replacing one that was cancelled.
    pub(crate) fn fresh_token(&self) -> CancellationToken {
        let mut guard = self.cancel.lock();
        if guard.is_cancelled() {
            *guard = CancellationToken::new();
        }
        guard.clone()
    }

    pub(crate) fn set_streaming(&self, running: bool) {
        self.is_streaming.store(running, Ordering::Release);
    }
}
