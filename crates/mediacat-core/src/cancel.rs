use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CrawlError;

/// Token for cooperative cancellation, checked between directory levels.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns Ok(()) to continue, Err if cancelled.
    pub fn check(&self) -> Result<(), CrawlError> {
        if self.is_cancelled() {
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        }
    }
}
