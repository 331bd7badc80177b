//! Fixed-size connection pool
//!
//! Each slot is a mutex around an optional connection. A slot holding
//! `None` has been closed. Acquisition never blocks past the caller's
//! deadline and polls the cancel token between waits.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rusqlite::Connection;
use statestore_core::{Error, OpContext, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Longest single wait on a slot before re-checking the context
const ACQUIRE_SLICE: Duration = Duration::from_millis(50);

/// A connection checked out of the pool
pub(crate) type PooledConnection<'a> = MappedMutexGuard<'a, Connection>;

pub(crate) struct ConnectionPool {
    slots: Vec<Mutex<Option<Connection>>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    pub(crate) fn new(connections: Vec<Connection>) -> Self {
        Self {
            slots: connections
                .into_iter()
                .map(|conn| Mutex::new(Some(conn)))
                .collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.slots.len()
    }

    /// Check out a connection, waiting until the context expires
    pub(crate) fn acquire(&self, ctx: &OpContext) -> Result<PooledConnection<'_>> {
        ctx.check()?;
        if self.slots.is_empty() {
            return Err(Error::Closed);
        }

        for slot in &self.slots {
            if let Some(guard) = slot.try_lock() {
                return checked_out(guard);
            }
        }

        // All busy: queue on one slot, round-robin so waiters spread out
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slot = &self.slots[idx];
        loop {
            let wait = ctx
                .remaining()
                .map_or(ACQUIRE_SLICE, |left| left.min(ACQUIRE_SLICE));
            if let Some(guard) = slot.try_lock_for(wait) {
                return checked_out(guard);
            }
            ctx.check()?;
        }
    }

    /// Close every connection, waiting for in-use ones to be returned
    pub(crate) fn close(&self) -> Result<()> {
        let mut first_err = None;
        for slot in &self.slots {
            if let Some(conn) = slot.lock().take() {
                if let Err((_, e)) = conn.close() {
                    first_err.get_or_insert(Error::backend(e));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn checked_out(guard: MutexGuard<'_, Option<Connection>>) -> Result<PooledConnection<'_>> {
    MutexGuard::try_map(guard, Option::as_mut).map_err(|_| Error::Closed)
}
