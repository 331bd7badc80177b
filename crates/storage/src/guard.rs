//! Read-only mode guard
//!
//! Writes against a store opened read-only are refused here, before a
//! transaction is opened or a statement reaches the driver.

use statestore_core::{Error, Result};

/// Refuses writes when the store was opened read-only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeGuard {
    read_only: bool,
}

impl ModeGuard {
    /// Guard for a store with the given mode
    pub fn new(read_only: bool) -> Self {
        Self { read_only }
    }

    /// Whether writes are refused
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Fail with [`Error::ReadOnlyStore`] if writes are refused
    #[inline]
    pub fn check_write(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnlyStore);
        }
        Ok(())
    }
}
