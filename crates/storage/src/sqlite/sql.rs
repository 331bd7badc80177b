//! SQL text for the SQLite dialect
//!
//! Table names are validated identifiers and are the only values ever
//! formatted into statement text. Keys, values, etags, JSON paths and query
//! operands are always bound as parameters.

use crate::backend::{Predicate, QuerySpec, Scalar};
use rusqlite::types::Value as SqlValue;
use statestore_core::{Error, Result};

/// Version written to the metadata table by [`SqlText::schema`]
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Metadata key holding the schema version
pub(crate) const MIGRATIONS_KEY: &str = "migrations";

const RECORD_COLUMNS: &str = "key, value, is_binary, etag, expire_at";

/// Check that `name` can be used verbatim as a table name
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidConfig(format!(
            "table name {name:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

/// Prepared statement text for one pair of tables
#[derive(Debug, Clone)]
pub(crate) struct SqlText {
    table: String,
    pub schema: String,
    pub get_record: String,
    pub get_live_record: String,
    pub upsert_record: String,
    pub update_record_if_etag: String,
    pub delete_record: String,
    pub delete_record_if_etag: String,
    pub delete_expired: String,
    pub get_metadata: String,
    pub upsert_metadata: String,
}

impl SqlText {
    pub(crate) fn new(table: &str, metadata_table: &str) -> Result<Self> {
        validate_identifier(table)?;
        validate_identifier(metadata_table)?;
        if table == metadata_table {
            return Err(Error::InvalidConfig(
                "records and metadata tables must differ".into(),
            ));
        }

        Ok(Self {
            table: table.to_string(),
            schema: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    key TEXT NOT NULL PRIMARY KEY,
                    value BLOB NOT NULL,
                    is_binary INTEGER NOT NULL,
                    etag TEXT NOT NULL,
                    expire_at INTEGER,
                    update_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS {table}_expire_at
                    ON {table} (expire_at) WHERE expire_at IS NOT NULL;
                CREATE TABLE IF NOT EXISTS {metadata_table} (
                    key TEXT NOT NULL PRIMARY KEY,
                    value TEXT NOT NULL
                );"
            ),
            get_record: format!("SELECT {RECORD_COLUMNS} FROM {table} WHERE key = ?1"),
            get_live_record: format!(
                "SELECT {RECORD_COLUMNS} FROM {table}
                 WHERE key = ?1 AND (expire_at IS NULL OR expire_at > ?2)"
            ),
            upsert_record: format!(
                "INSERT INTO {table} (key, value, is_binary, etag, expire_at, update_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    is_binary = excluded.is_binary,
                    etag = excluded.etag,
                    expire_at = excluded.expire_at,
                    update_at = excluded.update_at"
            ),
            update_record_if_etag: format!(
                "UPDATE {table}
                 SET value = ?2, is_binary = ?3, etag = ?4, expire_at = ?5, update_at = ?6
                 WHERE key = ?1 AND etag = ?7"
            ),
            delete_record: format!("DELETE FROM {table} WHERE key = ?1"),
            delete_record_if_etag: format!("DELETE FROM {table} WHERE key = ?1 AND etag = ?2"),
            delete_expired: format!(
                "DELETE FROM {table} WHERE expire_at IS NOT NULL AND expire_at <= ?1"
            ),
            get_metadata: format!("SELECT value FROM {metadata_table} WHERE key = ?1"),
            upsert_metadata: format!(
                "INSERT INTO {metadata_table} (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value"
            ),
        })
    }

    /// Render a record query and its positional parameters
    pub(crate) fn query(&self, spec: &QuerySpec) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM {}", self.table);

        let mut clauses = Vec::new();
        if let Some(filter) = &spec.filter {
            clauses.push(render_predicate(filter, &mut params));
        }
        if let Some(now) = spec.live_at_ms {
            params.push(SqlValue::Integer(now));
            clauses.push(format!(
                "(expire_at IS NULL OR expire_at > ?{})",
                params.len()
            ));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        for key in &spec.sort {
            let expr = field_expr("json_extract", &key.path, &mut params);
            let dir = if key.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!("{expr} {dir}, "));
        }
        sql.push_str("key ASC");

        let limit = spec
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        params.push(SqlValue::Integer(limit));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
        params.push(SqlValue::Integer(
            i64::try_from(spec.offset).unwrap_or(i64::MAX),
        ));
        sql.push_str(&format!(" OFFSET ?{}", params.len()));

        (sql, params)
    }
}

/// JSON path for a list of object keys, e.g. `$."person"."org"`
fn json_path(path: &[String]) -> String {
    let mut out = String::from("$");
    for seg in path {
        out.push_str(".\"");
        out.push_str(&seg.replace('"', "\\\""));
        out.push('"');
    }
    out
}

/// `func(value, path)` evaluated only for JSON rows; NULL for binary rows
fn field_expr(func: &str, path: &[String], params: &mut Vec<SqlValue>) -> String {
    params.push(SqlValue::Text(json_path(path)));
    format!(
        "(CASE WHEN is_binary = 0 THEN {func}(value, ?{}) END)",
        params.len()
    )
}

fn render_eq(path: &[String], value: &Scalar, params: &mut Vec<SqlValue>) -> String {
    match value {
        Scalar::Null => format!("{} = 'null'", field_expr("json_type", path, params)),
        Scalar::Bool(b) => {
            let ty = if *b { "'true'" } else { "'false'" };
            format!("{} = {ty}", field_expr("json_type", path, params))
        }
        Scalar::Int(n) => bind_cmp(path, SqlValue::Integer(*n), params),
        Scalar::Float(f) => bind_cmp(path, SqlValue::Real(*f), params),
        Scalar::Text(s) => bind_cmp(path, SqlValue::Text(s.clone()), params),
    }
}

fn bind_cmp(path: &[String], operand: SqlValue, params: &mut Vec<SqlValue>) -> String {
    let expr = field_expr("json_extract", path, params);
    params.push(operand);
    format!("{expr} = ?{}", params.len())
}

fn render_predicate(pred: &Predicate, params: &mut Vec<SqlValue>) -> String {
    match pred {
        Predicate::Eq { path, value } => render_eq(path, value, params),
        Predicate::In { path, values } => join(
            values.iter().map(|v| render_eq(path, v, params)).collect(),
            " OR ",
        ),
        Predicate::And(children) => join(
            children.iter().map(|c| render_predicate(c, params)).collect(),
            " AND ",
        ),
        Predicate::Or(children) => join(
            children.iter().map(|c| render_predicate(c, params)).collect(),
            " OR ",
        ),
    }
}

fn join(parts: Vec<String>, sep: &str) -> String {
    if parts.is_empty() {
        // Validated queries never produce empty groups
        return "(0)".to_string();
    }
    format!("({})", parts.join(sep))
}
