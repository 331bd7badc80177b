//! State Store Integration Test Suite
//!
//! Exercises the public API end to end against real SQLite databases,
//! in memory and on disk.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test state_store
//!
//! # Run cleanup tests only
//! cargo test --test state_store cleanup::
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use statestore::prelude::*;
use statestore::statestore_storage::{Backend, BackendTx, SqliteBackend, Statement, TxMode};
use statestore::{Feature, SqliteOptions, LAST_CLEANUP_KEY};
use tempfile::TempDir;

// Test modules
pub mod bulk;
pub mod cleanup;
pub mod deadline;
pub mod roundtrip;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Route engine logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Context with no deadline
pub fn ctx() -> OpContext {
    OpContext::background()
}

/// Fresh in-memory store without a cleanup timer
pub fn ephemeral() -> StateStore {
    init_tracing();
    StateStore::ephemeral().expect("open in-memory store")
}

/// Temp directory plus a database path inside it
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("state.db");
    (dir, path)
}

/// Open a file store with a manual clock and no cleanup timer
pub fn open_file_with_clock(path: &Path, clock: Arc<ManualClock>) -> StateStore {
    init_tracing();
    StateStore::builder()
        .connection(path.to_str().expect("utf-8 path"))
        .cleanup_interval(None)
        .clock(clock)
        .open()
        .expect("open file store")
}

/// Open a file store with the system clock
pub fn open_file(path: &Path, interval: Option<std::time::Duration>) -> StateStore {
    init_tracing();
    StateStore::builder()
        .connection(path.to_str().expect("utf-8 path"))
        .cleanup_interval(interval)
        .open()
        .expect("open file store")
}

/// Count rows in a table, bypassing the engine
pub fn count_rows(path: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(path).expect("open raw connection");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count rows")
}

/// Read the cleanup gate, bypassing the engine
pub fn last_cleanup(path: &Path) -> Option<i64> {
    let conn = rusqlite::Connection::open(path).expect("open raw connection");
    conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [LAST_CLEANUP_KEY],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .map(|v| v.parse().expect("numeric last-cleanup"))
}

/// SHA-256 of a file's bytes
pub fn file_hash(path: &Path) -> Vec<u8> {
    let bytes = std::fs::read(path).expect("read database file");
    Sha256::digest(&bytes).to_vec()
}

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Which statement a [`FaultyBackend`] transaction fails on
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The n-th write statement of each transaction (1-based)
    NthWrite(usize),
    /// Every statement with this name
    Statement(&'static str),
}

/// Backend wrapper whose transactions fail on a chosen statement
pub struct FaultyBackend {
    inner: SqliteBackend,
    fault: Fault,
}

impl FaultyBackend {
    /// In-memory backend failing on write number `fail_on_write` (1-based)
    pub fn in_memory(fail_on_write: usize) -> Self {
        Self {
            inner: SqliteBackend::open_in_memory().expect("open in-memory backend"),
            fault: Fault::NthWrite(fail_on_write),
        }
    }

    /// File backend failing on every statement named `statement`
    pub fn on_file(path: &Path, statement: &'static str) -> Self {
        let options = SqliteOptions::new(path.to_str().expect("utf-8 path"));
        Self {
            inner: SqliteBackend::open(&options).expect("open file backend"),
            fault: Fault::Statement(statement),
        }
    }
}

impl Backend for FaultyBackend {
    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn migrate(&self, ctx: &OpContext) -> statestore::Result<()> {
        self.inner.migrate(ctx)
    }

    fn begin(&self, ctx: &OpContext, mode: TxMode) -> statestore::Result<Box<dyn BackendTx + '_>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin(ctx, mode)?,
            writes: 0,
            fault: self.fault,
        }))
    }

    fn close(&self) -> statestore::Result<()> {
        self.inner.close()
    }
}

struct FaultyTx<'a> {
    inner: Box<dyn BackendTx + 'a>,
    writes: usize,
    fault: Fault,
}

impl BackendTx for FaultyTx<'_> {
    fn execute(
        &mut self,
        stmt: Statement<'_>,
    ) -> statestore::Result<statestore::statestore_storage::Outcome> {
        if stmt.is_write() {
            self.writes += 1;
        }
        let fail = match self.fault {
            Fault::NthWrite(n) => stmt.is_write() && self.writes == n,
            Fault::Statement(name) => stmt.name() == name,
        };
        if fail {
            return Err(Error::backend_msg(format!(
                "injected failure on {}",
                stmt.name()
            )));
        }
        self.inner.execute(stmt)
    }

    fn commit(self: Box<Self>) -> statestore::Result<()> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> statestore::Result<()> {
        self.inner.rollback()
    }
}

/// Backend wrapper counting the transactions it opens
pub struct CountingBackend {
    inner: SqliteBackend,
    begins: AtomicUsize,
}

impl CountingBackend {
    /// Writable in-memory backend
    pub fn in_memory() -> Self {
        Self {
            inner: SqliteBackend::open_in_memory().expect("open in-memory backend"),
            begins: AtomicUsize::new(0),
        }
    }

    /// Transactions opened so far
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn migrate(&self, ctx: &OpContext) -> statestore::Result<()> {
        self.inner.migrate(ctx)
    }

    fn begin(&self, ctx: &OpContext, mode: TxMode) -> statestore::Result<Box<dyn BackendTx + '_>> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin(ctx, mode)
    }

    fn close(&self) -> statestore::Result<()> {
        self.inner.close()
    }
}
