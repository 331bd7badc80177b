//! SQLite backend
//!
//! Records live in one table and bookkeeping entries in another:
//!
//! ```text
//! {table}           key TEXT PK | value | is_binary | etag | expire_at | update_at
//! {metadata_table}  key TEXT PK | value TEXT
//! ```
//!
//! Connections come from a fixed pool. A connection string of `:memory:`
//! (or any `mode=memory` URI) is a private database per connection, so the
//! pool is clamped to one connection in that case.

mod pool;
mod sql;
mod tx;

pub use sql::validate_identifier;

use crate::backend::{Backend, BackendTx, TxMode};
use pool::ConnectionPool;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use sql::{SqlText, MIGRATIONS_KEY, SCHEMA_VERSION};
use statestore_core::{Error, OpContext, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use tx::{classify, SqliteTx};

/// Default records table name
pub const DEFAULT_TABLE_NAME: &str = "state";
/// Default metadata table name
pub const DEFAULT_METADATA_TABLE_NAME: &str = "metadata";
/// Default SQLite busy timeout
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);
/// Default number of pooled connections for file databases
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

/// How to open a SQLite database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// `:memory:`, a file path, or a `file:` URI
    pub connection_string: String,
    /// Open without write access
    pub read_only: bool,
    /// Records table
    pub table_name: String,
    /// Bookkeeping table
    pub metadata_table_name: String,
    /// How long SQLite retries a locked database before failing
    pub busy_timeout: Duration,
    /// Pool size; `None` picks a default
    pub max_connections: Option<usize>,
}

impl SqliteOptions {
    /// Options with default table names and pool size
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            read_only: false,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            metadata_table_name: DEFAULT_METADATA_TABLE_NAME.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_connections: None,
        }
    }

    /// Whether the connection string names a private in-memory database
    pub fn is_memory(&self) -> bool {
        self.connection_string == ":memory:"
            || self.connection_string.starts_with("file::memory:")
            || self.uri_params().any(|(k, v)| k == "mode" && v == "memory")
    }

    /// Whether the store must be opened read-only, by option or by a
    /// `mode=ro` URI parameter
    pub fn wants_read_only(&self) -> bool {
        self.read_only || self.uri_params().any(|(k, v)| k == "mode" && v == "ro")
    }

    fn uri_params(&self) -> impl Iterator<Item = (&str, &str)> {
        let query = if self.connection_string.starts_with("file:") {
            self.connection_string
                .split_once('?')
                .map_or("", |(_, q)| q)
        } else {
            ""
        };
        query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| p.split_once('=').unwrap_or((p, "")))
    }

    fn pool_size(&self) -> usize {
        if self.is_memory() {
            1
        } else {
            self.max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS)
                .max(1)
        }
    }
}

/// A pooled SQLite database
pub struct SqliteBackend {
    pool: ConnectionPool,
    sql: SqlText,
    read_only: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("connections", &self.pool.size())
            .field("read_only", &self.read_only)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SqliteBackend {
    /// Open the database and fill the pool. Does not create tables; see
    /// [`Backend::migrate`].
    pub fn open(options: &SqliteOptions) -> Result<Self> {
        let sql = SqlText::new(&options.table_name, &options.metadata_table_name)?;
        let read_only = options.wants_read_only();

        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let size = options.pool_size();
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(&options.connection_string, flags)
                .map_err(Error::backend)?;
            conn.busy_timeout(options.busy_timeout)
                .map_err(Error::backend)?;
            connections.push(conn);
        }

        info!(
            table = %options.table_name,
            connections = size,
            read_only,
            "opened sqlite store"
        );

        Ok(Self {
            pool: ConnectionPool::new(connections),
            sql,
            read_only,
            closed: AtomicBool::new(false),
        })
    }

    /// Open `:memory:` with default options
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteOptions::new(":memory:"))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn migrate(&self, ctx: &OpContext) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            debug!("read-only store, skipping migrations");
            return Ok(());
        }

        let conn = self.pool.acquire(ctx)?;
        let tx = rusqlite::Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)
            .map_err(|e| classify(e, ctx))?;
        tx.execute_batch(&self.sql.schema)
            .map_err(|e| classify(e, ctx))?;

        let current: Option<String> = tx
            .query_row(&self.sql.get_metadata, [MIGRATIONS_KEY], |row| row.get(0))
            .optional()
            .map_err(|e| classify(e, ctx))?;
        match current.as_deref().map(str::parse::<i64>) {
            None => {
                let version = SCHEMA_VERSION.to_string();
                tx.execute(&self.sql.upsert_metadata, params![MIGRATIONS_KEY, version])
                    .map_err(|e| classify(e, ctx))?;
            }
            Some(Ok(v)) if v > SCHEMA_VERSION => {
                return Err(Error::backend_msg(format!(
                    "schema version {v} is newer than supported version {SCHEMA_VERSION}"
                )));
            }
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                return Err(Error::corrupt(format!(
                    "unreadable schema version {current:?}"
                )));
            }
        }

        tx.commit().map_err(|e| classify(e, ctx))?;
        debug!(version = SCHEMA_VERSION, "migrations applied");
        Ok(())
    }

    fn begin(&self, ctx: &OpContext, mode: TxMode) -> Result<Box<dyn BackendTx + '_>> {
        self.ensure_open()?;
        let conn = self.pool.acquire(ctx)?;
        let tx = SqliteTx::begin(conn, &self.sql, ctx, mode)?;
        Ok(Box::new(tx))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pool.close()?;
        info!("closed sqlite store");
        Ok(())
    }
}
