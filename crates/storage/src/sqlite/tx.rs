//! SQLite transactions
//!
//! A [`SqliteTx`] owns a pooled connection for its lifetime. While it is
//! open, SQLite's progress handler polls the operation context so a
//! statement that outlives its deadline, or whose caller cancels, is
//! interrupted and the transaction rolled back.

use super::pool::PooledConnection;
use super::sql::SqlText;
use crate::backend::{BackendTx, Outcome, RecordRow, RecordWrite, Statement, TxMode};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use statestore_core::{Error, OpContext, Result};
use tracing::{trace, warn};

/// Virtual-machine instructions between progress-handler polls
const PROGRESS_INTERVAL: i32 = 1_000;

pub(crate) struct SqliteTx<'a> {
    conn: PooledConnection<'a>,
    sql: &'a SqlText,
    ctx: OpContext,
    mode: TxMode,
    finished: bool,
}

impl<'a> SqliteTx<'a> {
    pub(crate) fn begin(
        conn: PooledConnection<'a>,
        sql: &'a SqlText,
        ctx: &OpContext,
        mode: TxMode,
    ) -> Result<Self> {
        install_interrupt(&conn, ctx);
        let begin = match mode {
            TxMode::Read => "BEGIN DEFERRED",
            TxMode::Write => "BEGIN IMMEDIATE",
        };
        if let Err(e) = conn.execute_batch(begin) {
            clear_interrupt(&conn);
            return Err(classify(e, ctx));
        }
        Ok(Self {
            conn,
            sql,
            ctx: ctx.clone(),
            mode,
            finished: false,
        })
    }

    fn finish(&mut self, command: &str) -> Result<()> {
        clear_interrupt(&self.conn);
        self.finished = true;
        let result = self
            .conn
            .execute_batch(command)
            .map_err(|e| classify(e, &self.ctx));
        // A failed COMMIT can leave the transaction open on this connection
        if result.is_err() && !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback after failed {command} failed");
            }
        }
        result
    }

    fn write_record(&self, text: &str, w: &RecordWrite<'_>, extra: Option<&str>) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(text)
            .map_err(|e| classify(e, &self.ctx))?;
        let payload = payload(w.value, w.is_binary);
        let affected = match extra {
            None => stmt.execute(params![
                w.key,
                payload,
                w.is_binary,
                w.etag,
                w.expire_at_ms,
                w.update_at_ms
            ]),
            Some(expected) => stmt.execute(params![
                w.key,
                payload,
                w.is_binary,
                w.etag,
                w.expire_at_ms,
                w.update_at_ms,
                expected
            ]),
        };
        affected.map_err(|e| classify(e, &self.ctx))
    }

    fn run(&self, stmt: Statement<'_>) -> Result<Outcome> {
        let conn: &Connection = &self.conn;
        let sql = self.sql;
        let ctx = &self.ctx;
        let fail = |e: rusqlite::Error| classify(e, ctx);

        match stmt {
            Statement::GetRecord { key, live_at_ms } => {
                let row = match live_at_ms {
                    None => conn
                        .prepare_cached(&sql.get_record)
                        .and_then(|mut s| s.query_row(params![key], read_record).optional()),
                    Some(now) => conn
                        .prepare_cached(&sql.get_live_record)
                        .and_then(|mut s| s.query_row(params![key, now], read_record).optional()),
                }
                .map_err(fail)?;
                Ok(Outcome::Record(row))
            }
            Statement::UpsertRecord(write) => self
                .write_record(&sql.upsert_record, &write, None)
                .map(Outcome::Affected),
            Statement::UpdateRecordIfEtag {
                write,
                expected_etag,
            } => self
                .write_record(&sql.update_record_if_etag, &write, Some(expected_etag))
                .map(Outcome::Affected),
            Statement::DeleteRecord { key } => conn
                .prepare_cached(&sql.delete_record)
                .and_then(|mut s| s.execute(params![key]))
                .map(Outcome::Affected)
                .map_err(fail),
            Statement::DeleteRecordIfEtag { key, expected_etag } => conn
                .prepare_cached(&sql.delete_record_if_etag)
                .and_then(|mut s| s.execute(params![key, expected_etag]))
                .map(Outcome::Affected)
                .map_err(fail),
            Statement::DeleteExpired { now_ms } => conn
                .prepare_cached(&sql.delete_expired)
                .and_then(|mut s| s.execute(params![now_ms]))
                .map(Outcome::Affected)
                .map_err(fail),
            Statement::GetMetadata { key } => conn
                .prepare_cached(&sql.get_metadata)
                .and_then(|mut s| {
                    s.query_row(params![key], |row| row.get::<_, String>(0))
                        .optional()
                })
                .map(Outcome::Metadata)
                .map_err(fail),
            Statement::UpsertMetadata { key, value } => conn
                .prepare_cached(&sql.upsert_metadata)
                .and_then(|mut s| s.execute(params![key, value]))
                .map(Outcome::Affected)
                .map_err(fail),
            Statement::QueryRecords(spec) => {
                let (text, args) = sql.query(spec);
                let mut s = conn.prepare(&text).map_err(fail)?;
                let rows = s
                    .query_map(params_from_iter(args), read_record)
                    .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
                    .map_err(fail)?;
                Ok(Outcome::Records(rows))
            }
        }
    }
}

impl BackendTx for SqliteTx<'_> {
    fn execute(&mut self, stmt: Statement<'_>) -> Result<Outcome> {
        self.ctx.check()?;
        if stmt.is_write() && self.mode == TxMode::Read {
            return Err(Error::backend_msg(format!(
                "{} executed in a read transaction",
                stmt.name()
            )));
        }
        trace!(statement = stmt.name(), "execute");
        self.run(stmt)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        // Past this check the commit is allowed to finish
        self.ctx.check()?;
        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        clear_interrupt(&self.conn);
        if !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

/// Interrupt running statements once `ctx` is cancelled or expired
fn install_interrupt(conn: &Connection, ctx: &OpContext) {
    if !ctx.is_bounded() {
        return;
    }
    let ctx = ctx.clone();
    conn.progress_handler(
        PROGRESS_INTERVAL,
        Some(move || ctx.is_cancelled() || ctx.is_expired()),
    );
}

fn clear_interrupt(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
}

/// Map a driver error onto the store's taxonomy
pub(crate) fn classify(err: rusqlite::Error, ctx: &OpContext) -> Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => ctx.interruption(),
        Some(ErrorCode::ReadOnly) => Error::ReadOnlyStore,
        _ => Error::backend(err),
    }
}

/// Bind a payload as TEXT for JSON records and BLOB for binary ones
fn payload(value: &[u8], is_binary: bool) -> ToSqlOutput<'_> {
    if is_binary {
        ToSqlOutput::Borrowed(ValueRef::Blob(value))
    } else {
        ToSqlOutput::Borrowed(ValueRef::Text(value))
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    let value = match row.get_ref(1)? {
        ValueRef::Text(b) | ValueRef::Blob(b) => b.to_vec(),
        ValueRef::Null => Vec::new(),
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                1,
                "value".into(),
                other.data_type(),
            ))
        }
    };
    Ok(RecordRow {
        key: row.get(0)?,
        value,
        is_binary: row.get(2)?,
        etag: row.get(3)?,
        expire_at_ms: row.get(4)?,
    })
}
