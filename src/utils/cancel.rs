//! Cancellation utilities
//!
//! A first-class cancellation handle for batch runs. Cancellation is
//! cooperative: in-flight attempts finish or time out naturally, while tasks
//! not yet admitted observe the flag and stop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Queued tasks observing this handle will stop
    /// being admitted; running attempts are not interrupted.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
