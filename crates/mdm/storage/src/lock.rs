//! Process-wide writer serialization.

use std::time::Duration;

use mdm_core::{Error, Result};
use parking_lot::{Mutex, MutexGuard};

/// Single writer lock shared by every mutating operation of a backend.
#[derive(Default)]
pub struct WriteLock {
    inner: Mutex<()>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `timeout` for the lock.
    pub fn acquire(&self, timeout: Duration, operation: &str) -> Result<MutexGuard<'_, ()>> {
        self.inner.try_lock_for(timeout).ok_or_else(|| {
            tracing::warn!(operation, ?timeout, "writer lock wait exceeded deadline");
            Error::Timeout {
                operation: operation.to_string(),
            }
        })
    }
}
