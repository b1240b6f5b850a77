//! Per-session cancellation tokens.
//!
//! Each running turn gets a `CancelToken`; the runner checks it at every
//! suspension point (before an LLM call, during streaming, before each
//! tool). An in-flight tool call finishes before the cancellation is
//! observed, so the store never sees a half-recorded mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token that can be checked by the runtime loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
