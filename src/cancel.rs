//! Cooperative cancellation for long-running scans
//!
//! Startup reconstruction, compaction, and event streaming check the token
//! between records and abort with `MapStoreError::Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MapStoreError, Result};

/// Shared cancellation flag. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every holder of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MapStoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}
