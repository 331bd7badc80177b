//! Engine lifecycle
//!
//! An [`Engine`] owns the backend, the read-only guard, the clock and the
//! cleanup scheduler. Operations live in sibling modules as further `impl
//! Engine` blocks; they all funnel through [`StoreInner::in_write_tx`] and
//! [`StoreInner::in_read_tx`], which apply the guard, the default timeout
//! and rollback-on-error in one place.

use crate::cleanup::CleanupScheduler;
use crate::config::StoreConfig;
use parking_lot::Mutex;
use statestore_core::{Clock, Error, Feature, OpContext, Result, SystemClock};
use statestore_storage::{Backend, BackendTx, ModeGuard, SqliteBackend, TxMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const FEATURES: &[Feature] = &[Feature::ETag, Feature::Transactional, Feature::QueryApi];

/// State shared between the engine and its cleanup thread
pub(crate) struct StoreInner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) guard: ModeGuard,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: StoreConfig,
    closed: AtomicBool,
}

impl StoreInner {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Instant before which rows count as expired on read, if reads filter
    pub(crate) fn live_at(&self) -> Option<i64> {
        self.config
            .filter_expired_on_read
            .then(|| self.clock.now_millis())
    }

    /// Run `f` in a write transaction, committing on success.
    ///
    /// The guard is checked before a connection is taken.
    pub(crate) fn in_write_tx<T>(
        &self,
        ctx: &OpContext,
        op: &'static str,
        f: impl FnOnce(&mut dyn BackendTx) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        self.guard.check_write()?;
        self.in_tx(ctx, op, TxMode::Write, f)
    }

    /// Run `f` in a read transaction
    pub(crate) fn in_read_tx<T>(
        &self,
        ctx: &OpContext,
        op: &'static str,
        f: impl FnOnce(&mut dyn BackendTx) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        self.in_tx(ctx, op, TxMode::Read, f)
    }

    fn in_tx<T>(
        &self,
        ctx: &OpContext,
        op: &'static str,
        mode: TxMode,
        f: impl FnOnce(&mut dyn BackendTx) -> Result<T>,
    ) -> Result<T> {
        let ctx = ctx.or_timeout(self.config.timeout);
        let start = Instant::now();
        let mut tx = self.backend.begin(&ctx, mode)?;
        match f(&mut *tx) {
            Ok(value) => {
                tx.commit()?;
                debug!(op, elapsed_ms = start.elapsed().as_millis() as u64, "committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    error!(op, error = %rollback, "rollback failed");
                }
                debug!(op, error = %e, "rolled back");
                Err(e)
            }
        }
    }
}

/// The state store engine.
///
/// `Engine` is `Send + Sync`; share it behind an `Arc`.
///
/// # Example
///
/// ```
/// use statestore_core::{GetRequest, OpContext, SetRequest};
/// use statestore_engine::{Engine, StoreConfig};
///
/// let engine = Engine::init(StoreConfig::in_memory().cleanup_interval(None)).unwrap();
/// let ctx = OpContext::background();
///
/// let etag = engine.set(&ctx, &SetRequest::new("k", "v")).unwrap();
/// let item = engine.get(&ctx, &GetRequest::new("k")).unwrap();
/// assert_eq!(item.etag, etag);
///
/// engine.close().unwrap();
/// ```
pub struct Engine {
    pub(crate) inner: Arc<StoreInner>,
    scheduler: Mutex<Option<CleanupScheduler>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("table", &self.inner.config.table_name)
            .field("read_only", &self.inner.guard.is_read_only())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Engine {
    /// Open the SQLite backend described by `config` with the system clock
    pub fn init(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = SqliteBackend::open(&config.sqlite_options())?;
        Self::with_backend(config, Arc::new(backend), Arc::new(SystemClock))
    }

    /// Build an engine over an already-open backend.
    ///
    /// Runs migrations unless the store is read-only, then starts the
    /// cleanup timer if it is enabled and the store is writable.
    pub fn with_backend(
        config: StoreConfig,
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let guard = ModeGuard::new(config.read_only || backend.is_read_only());
        if !guard.is_read_only() {
            backend.migrate(&OpContext::with_timeout(config.timeout))?;
        }

        let interval = config.cleanup_interval;
        let inner = Arc::new(StoreInner {
            backend,
            guard,
            clock,
            config,
            closed: AtomicBool::new(false),
        });

        let scheduler = match interval {
            Some(interval) if !guard.is_read_only() => {
                Some(CleanupScheduler::start(Arc::clone(&inner), interval)?)
            }
            _ => None,
        };

        info!(
            table = %inner.config.table_name,
            read_only = guard.is_read_only(),
            cleanup = scheduler.is_some(),
            "state store initialized"
        );

        Ok(Self {
            inner,
            scheduler: Mutex::new(scheduler),
        })
    }

    /// Capabilities this store supports
    pub fn features(&self) -> &'static [Feature] {
        FEATURES
    }

    /// The configuration the engine was built with
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Whether writes are refused
    pub fn is_read_only(&self) -> bool {
        self.inner.guard.is_read_only()
    }

    /// Whether a cleanup timer is running
    pub fn is_cleanup_scheduled(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Stop the cleanup timer and release the backend.
    ///
    /// An in-flight sweep finishes first. Closing twice is a no-op; every
    /// other operation fails with [`Error::Closed`] afterwards.
    pub fn close(&self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.backend.close()?;
        info!(table = %self.inner.config.table_name, "state store closed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.get_mut().take() {
            scheduler.stop();
        }
    }
}
