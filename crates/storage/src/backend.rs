//! Abstract executable-statement interface
//!
//! The engine never sees SQL. It opens a [`BackendTx`] from a [`Backend`]
//! and executes typed [`Statement`]s against it; each backend renders them
//! in its own dialect. All values travel as bound parameters.
//!
//! ```text
//! Engine ──begin(ctx, mode)──▶ Backend
//!   │                            │
//!   └──execute(Statement)──▶ BackendTx ──commit()/rollback()
//! ```
//!
//! Dropping a transaction without committing rolls it back.

use statestore_core::{Error, OpContext, Result};

/// Whether a transaction may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads only
    Read,
    /// Reads and writes; takes the store's writer lock up front
    Write,
}

/// Columns written for one record
#[derive(Debug, Clone, Copy)]
pub struct RecordWrite<'a> {
    /// Primary key
    pub key: &'a str,
    /// Encoded payload
    pub value: &'a [u8],
    /// Codec flag for `value`
    pub is_binary: bool,
    /// Freshly issued version token
    pub etag: &'a str,
    /// Expiration as Unix millis
    pub expire_at_ms: Option<i64>,
    /// Write time as Unix millis
    pub update_at_ms: i64,
}

/// A record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    /// Primary key
    pub key: String,
    /// Encoded payload
    pub value: Vec<u8>,
    /// Codec flag for `value`
    pub is_binary: bool,
    /// Current version token
    pub etag: String,
    /// Expiration as Unix millis
    pub expire_at_ms: Option<i64>,
}

/// Scalar operand of a field predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// JSON null
    Null,
    /// JSON boolean
    Bool(bool),
    /// Integral JSON number
    Int(i64),
    /// Non-integral JSON number
    Float(f64),
    /// JSON string
    Text(String),
}

/// Dialect-free filter over fields of JSON values.
///
/// Field paths are lists of already-validated object keys. Binary records
/// never satisfy a field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the operand
    Eq {
        /// Path of object keys
        path: Vec<String>,
        /// Operand
        value: Scalar,
    },
    /// Field equals one of the operands
    In {
        /// Path of object keys
        path: Vec<String>,
        /// Operands, never empty
        values: Vec<Scalar>,
    },
    /// All children hold
    And(Vec<Predicate>),
    /// At least one child holds
    Or(Vec<Predicate>),
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Path of object keys
    pub path: Vec<String>,
    /// Descending order
    pub descending: bool,
}

/// Validated, dialect-free record query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Row filter
    pub filter: Option<Predicate>,
    /// Sort keys, applied in order; the key column breaks ties
    pub sort: Vec<SortKey>,
    /// Maximum rows to return
    pub limit: Option<u64>,
    /// Rows to skip
    pub offset: u64,
    /// When set, hide rows whose expiration is at or before this instant
    pub live_at_ms: Option<i64>,
}

/// A statement the engine can execute
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    /// Fetch one record. With `live_at_ms`, an expired row reads as absent.
    GetRecord {
        /// Key to read
        key: &'a str,
        /// Hide rows expired at this instant
        live_at_ms: Option<i64>,
    },
    /// Insert, or replace value/etag/expiration of an existing row
    UpsertRecord(RecordWrite<'a>),
    /// Replace an existing row only if its etag matches
    UpdateRecordIfEtag {
        /// New columns
        write: RecordWrite<'a>,
        /// Etag the row must currently carry
        expected_etag: &'a str,
    },
    /// Delete a row if present
    DeleteRecord {
        /// Key to delete
        key: &'a str,
    },
    /// Delete a row only if its etag matches
    DeleteRecordIfEtag {
        /// Key to delete
        key: &'a str,
        /// Etag the row must currently carry
        expected_etag: &'a str,
    },
    /// Delete every row with a non-null expiration at or before `now_ms`
    DeleteExpired {
        /// Cut-off as Unix millis
        now_ms: i64,
    },
    /// Read a bookkeeping entry
    GetMetadata {
        /// Bookkeeping key
        key: &'a str,
    },
    /// Insert or overwrite a bookkeeping entry
    UpsertMetadata {
        /// Bookkeeping key
        key: &'a str,
        /// New value
        value: &'a str,
    },
    /// Run a record query
    QueryRecords(&'a QuerySpec),
}

impl Statement<'_> {
    /// Whether executing this statement mutates the store
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Statement::GetRecord { .. }
                | Statement::GetMetadata { .. }
                | Statement::QueryRecords(_)
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Statement::GetRecord { .. } => "get_record",
            Statement::UpsertRecord(_) => "upsert_record",
            Statement::UpdateRecordIfEtag { .. } => "update_record_if_etag",
            Statement::DeleteRecord { .. } => "delete_record",
            Statement::DeleteRecordIfEtag { .. } => "delete_record_if_etag",
            Statement::DeleteExpired { .. } => "delete_expired",
            Statement::GetMetadata { .. } => "get_metadata",
            Statement::UpsertMetadata { .. } => "upsert_metadata",
            Statement::QueryRecords(_) => "query_records",
        }
    }
}

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows changed by a write
    Affected(usize),
    /// Single record lookup
    Record(Option<RecordRow>),
    /// Bookkeeping lookup
    Metadata(Option<String>),
    /// Query result rows, in order
    Records(Vec<RecordRow>),
}

impl Outcome {
    /// Expect [`Outcome::Affected`]
    pub fn into_affected(self) -> Result<usize> {
        match self {
            Outcome::Affected(n) => Ok(n),
            other => Err(unexpected("affected", &other)),
        }
    }

    /// Expect [`Outcome::Record`]
    pub fn into_record(self) -> Result<Option<RecordRow>> {
        match self {
            Outcome::Record(r) => Ok(r),
            other => Err(unexpected("record", &other)),
        }
    }

    /// Expect [`Outcome::Metadata`]
    pub fn into_metadata(self) -> Result<Option<String>> {
        match self {
            Outcome::Metadata(v) => Ok(v),
            other => Err(unexpected("metadata", &other)),
        }
    }

    /// Expect [`Outcome::Records`]
    pub fn into_records(self) -> Result<Vec<RecordRow>> {
        match self {
            Outcome::Records(rows) => Ok(rows),
            other => Err(unexpected("records", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Outcome) -> Error {
    Error::backend_msg(format!("backend returned {got:?} where {wanted} was expected"))
}

/// A backing store the engine can run statements against
pub trait Backend: Send + Sync {
    /// Whether the store was opened read-only
    fn is_read_only(&self) -> bool;

    /// Create the records and metadata tables if missing
    fn migrate(&self, ctx: &OpContext) -> Result<()>;

    /// Start a transaction. Blocks for a connection until the context's
    /// deadline.
    fn begin(&self, ctx: &OpContext, mode: TxMode) -> Result<Box<dyn BackendTx + '_>>;

    /// Release connections. Later calls fail with [`Error::Closed`].
    fn close(&self) -> Result<()>;
}

/// An open transaction
pub trait BackendTx {
    /// Execute one statement inside the transaction
    fn execute(&mut self, stmt: Statement<'_>) -> Result<Outcome>;

    /// Make every executed statement durable
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every executed statement
    fn rollback(self: Box<Self>) -> Result<()>;
}
