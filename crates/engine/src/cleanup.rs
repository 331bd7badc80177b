//! Expired record cleanup
//!
//! A sweep is gated on the `last-cleanup` metadata entry: if less than one
//! interval has passed since the recorded sweep, nothing is scanned. The
//! gate read, the delete and the gate update share one write transaction,
//! so a failed delete leaves the gate where it was and the next tick
//! retries from the same state.
//!
//! ```text
//!   ┌──────────── wait(interval) ◀──────────┐
//!   ▼                                        │
//! tick ──gate closed──▶ Skipped ─────────────┤
//!   │                                        │
//!   └──gate open──▶ DELETE expired           │
//!                   UPSERT last-cleanup ─────┘
//! ```
//!
//! Deleting rows with `expire_at <= now` is idempotent, so two stores that
//! race past the gate only repeat harmless work.

use crate::config::DEFAULT_CLEANUP_INTERVAL;
use crate::engine::{Engine, StoreInner};
use parking_lot::{Condvar, Mutex, MutexGuard};
use statestore_core::clock::saturating_millis;
use statestore_core::{Error, OpContext, Result};
use statestore_storage::Statement;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Metadata key recording when the last sweep finished, as Unix millis
pub const LAST_CLEANUP_KEY: &str = "last-cleanup";

/// Result of one cleanup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The previous sweep is too recent
    Skipped,
    /// Expired rows were deleted and the gate advanced
    Swept {
        /// Rows removed
        deleted: usize,
    },
}

impl StoreInner {
    pub(crate) fn cleanup_expired(&self, ctx: &OpContext) -> Result<CleanupOutcome> {
        let interval = saturating_millis(
            self.config
                .cleanup_interval
                .unwrap_or(DEFAULT_CLEANUP_INTERVAL),
        );

        self.in_write_tx(ctx, "cleanup", |tx| {
            let now = self.clock.now_millis();
            let last = tx
                .execute(Statement::GetMetadata {
                    key: LAST_CLEANUP_KEY,
                })?
                .into_metadata()?;

            if let Some(last) = last.as_deref().and_then(parse_last_cleanup) {
                let elapsed = now.saturating_sub(last);
                if elapsed < interval {
                    debug!(elapsed_ms = elapsed, "cleanup gate closed");
                    return Ok(CleanupOutcome::Skipped);
                }
            }

            let deleted = tx
                .execute(Statement::DeleteExpired { now_ms: now })?
                .into_affected()?;
            tx.execute(Statement::UpsertMetadata {
                key: LAST_CLEANUP_KEY,
                value: &now.to_string(),
            })?;
            Ok(CleanupOutcome::Swept { deleted })
        })
    }
}

fn parse_last_cleanup(raw: &str) -> Option<i64> {
    match raw.trim().parse() {
        Ok(millis) => Some(millis),
        Err(_) => {
            warn!(value = raw, "unreadable {LAST_CLEANUP_KEY} entry, treating as never run");
            None
        }
    }
}

impl Engine {
    /// Delete expired records if the cleanup gate is open.
    ///
    /// Uses the configured interval for the gate, or one hour when the
    /// timer is disabled.
    pub fn cleanup_expired(&self, ctx: &OpContext) -> Result<CleanupOutcome> {
        let outcome = self.inner.cleanup_expired(ctx)?;
        if let CleanupOutcome::Swept { deleted } = outcome {
            info!(deleted, "expired records swept");
        }
        Ok(outcome)
    }
}

struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Background thread running [`Engine::cleanup_expired`] once per interval
pub struct CleanupScheduler {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    pub(crate) fn start(inner: Arc<StoreInner>, interval: Duration) -> Result<Self> {
        let signal = Arc::new(Signal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("statestore-cleanup".into())
            .spawn(move || run(&inner, &thread_signal, interval))
            .map_err(Error::backend)?;

        info!(interval_secs = interval.as_secs(), "cleanup scheduler started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the timer. A sweep already running is allowed to finish; no
    /// tick fires afterwards. Stopping twice is a no-op.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if handle.join().is_err() {
            warn!("cleanup thread panicked");
        }
        info!("cleanup scheduler stopped");
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(inner: &StoreInner, signal: &Signal, interval: Duration) {
    let mut stopped = signal.stopped.lock();
    loop {
        let deadline = Instant::now().checked_add(interval);
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if signal.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => signal.wake.wait(&mut stopped),
            }
        }
        if *stopped {
            return;
        }

        // Release the flag while sweeping so stop() can be requested
        MutexGuard::unlocked(&mut stopped, || tick(inner));
    }
}

fn tick(inner: &StoreInner) {
    match inner.cleanup_expired(&OpContext::background()) {
        Ok(CleanupOutcome::Swept { deleted }) => info!(deleted, "expired records swept"),
        Ok(CleanupOutcome::Skipped) => debug!("cleanup skipped"),
        Err(e) => warn!(error = %e, "cleanup failed"),
    }
}
