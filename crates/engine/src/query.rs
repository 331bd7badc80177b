//! Structured queries over JSON values
//!
//! The query language is a small JSON document:
//!
//! ```json
//! {
//!   "filter": { "AND": [ { "EQ": { "person.org": "Dev Ops" } },
//!                        { "IN": { "state": ["CA", "WA"] } } ] },
//!   "sort": [ { "key": "person.id", "order": "DESC" } ],
//!   "page": { "limit": 10, "token": "MTA=" }
//! }
//! ```
//!
//! Field names are dot-separated paths into the stored JSON. A query is
//! validated completely and translated into a storage [`QuerySpec`] before
//! any statement runs. Continuation tokens are opaque; they encode the
//! offset of the next page.

use crate::crud::decode_row;
use crate::engine::Engine;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use statestore_core::{ETag, Error, OpContext, Result, StateValue};
use statestore_storage::{Predicate, QuerySpec, Scalar, SortKey, Statement};
use std::collections::BTreeMap;
use tracing::debug;

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals a scalar
    Eq {
        /// Dot-separated field path
        field: String,
        /// Scalar to compare with
        value: JsonValue,
    },
    /// Field equals one of several scalars
    In {
        /// Dot-separated field path
        field: String,
        /// Candidate scalars
        values: Vec<JsonValue>,
    },
    /// Every child matches
    And(Vec<Filter>),
    /// Some child matches
    Or(Vec<Filter>),
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SortOrder {
    /// Ascending
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    /// Descending
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sorting {
    /// Dot-separated field path
    pub key: String,
    /// Direction
    #[serde(default)]
    pub order: SortOrder,
}

/// Page size and continuation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pagination {
    /// Maximum results per page
    #[serde(default)]
    pub limit: Option<u64>,
    /// Token returned by the previous page
    #[serde(default)]
    pub token: Option<String>,
}

/// A structured query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Row filter; `None` matches everything
    pub filter: Option<Filter>,
    /// Sort keys in priority order; ties are broken by key
    pub sort: Vec<Sorting>,
    /// Pagination
    pub page: Pagination,
}

/// One query result
#[derive(Debug, Clone, PartialEq)]
pub struct QueryItem {
    /// Record key
    pub key: String,
    /// Decoded value
    pub value: StateValue,
    /// Current etag
    pub etag: ETag,
}

/// A page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Results in order
    pub results: Vec<QueryItem>,
    /// Present when more results remain
    pub token: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQuery {
    #[serde(default)]
    filter: Option<JsonValue>,
    #[serde(default)]
    sort: Vec<Sorting>,
    #[serde(default)]
    page: Pagination,
}

#[derive(Deserialize)]
enum RawFilter {
    #[serde(rename = "EQ")]
    Eq(BTreeMap<String, JsonValue>),
    #[serde(rename = "IN")]
    In(BTreeMap<String, Vec<JsonValue>>),
    #[serde(rename = "AND")]
    And(Vec<RawFilter>),
    #[serde(rename = "OR")]
    Or(Vec<RawFilter>),
}

impl RawFilter {
    fn into_filter(self) -> Result<Filter> {
        Ok(match self {
            RawFilter::Eq(map) => {
                let (field, value) = single_entry("EQ", map)?;
                Filter::Eq { field, value }
            }
            RawFilter::In(map) => {
                let (field, values) = single_entry("IN", map)?;
                Filter::In { field, values }
            }
            RawFilter::And(children) => Filter::And(
                children
                    .into_iter()
                    .map(RawFilter::into_filter)
                    .collect::<Result<_>>()?,
            ),
            RawFilter::Or(children) => Filter::Or(
                children
                    .into_iter()
                    .map(RawFilter::into_filter)
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

fn single_entry<V>(op: &str, map: BTreeMap<String, V>) -> Result<(String, V)> {
    if map.len() != 1 {
        return Err(Error::InvalidQuery(format!(
            "{op} takes exactly one field, got {}",
            map.len()
        )));
    }
    map.into_iter()
        .next()
        .ok_or_else(|| Error::InvalidQuery(format!("{op} takes exactly one field")))
}

impl Query {
    /// Parse the JSON query language
    pub fn from_json(s: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(s)
            .map_err(|e| Error::InvalidQuery(format!("malformed query: {e}")))?;
        Self::from_value(value)
    }

    /// Parse an already-decoded JSON query
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let raw: RawQuery = serde_json::from_value(value)
            .map_err(|e| Error::InvalidQuery(format!("malformed query: {e}")))?;

        let filter = match raw.filter {
            None => None,
            Some(JsonValue::Object(map)) if map.is_empty() => None,
            Some(value) => {
                let raw: RawFilter = serde_json::from_value(value)
                    .map_err(|e| Error::InvalidQuery(format!("malformed filter: {e}")))?;
                Some(raw.into_filter()?)
            }
        };

        let query = Self {
            filter,
            sort: raw.sort,
            page: raw.page,
        };
        query.validate()?;
        Ok(query)
    }

    /// Set the row filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a sort key
    pub fn sort_by(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(Sorting {
            key: key.into(),
            order,
        });
        self
    }

    /// Limit the page size
    pub fn limit(mut self, limit: u64) -> Self {
        self.page.limit = Some(limit);
        self
    }

    /// Continue from a previous page
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.page.token = Some(token.into());
        self
    }

    /// Check the query without translating it
    pub fn validate(&self) -> Result<()> {
        self.to_spec(None).map(|_| ())
    }

    /// Translate into a storage query
    pub(crate) fn to_spec(&self, live_at_ms: Option<i64>) -> Result<QuerySpec> {
        if self.page.limit == Some(0) {
            return Err(Error::InvalidQuery("limit must be positive".into()));
        }
        let offset = match &self.page.token {
            Some(token) => decode_token(token)?,
            None => 0,
        };
        let filter = self.filter.as_ref().map(translate).transpose()?;
        let sort = self
            .sort
            .iter()
            .map(|s| {
                Ok(SortKey {
                    path: field_path(&s.key)?,
                    descending: s.order == SortOrder::Desc,
                })
            })
            .collect::<Result<_>>()?;

        Ok(QuerySpec {
            filter,
            sort,
            limit: self.page.limit,
            offset,
            live_at_ms,
        })
    }
}

fn translate(filter: &Filter) -> Result<Predicate> {
    match filter {
        Filter::Eq { field, value } => Ok(Predicate::Eq {
            path: field_path(field)?,
            value: scalar(value)?,
        }),
        Filter::In { field, values } => {
            if values.is_empty() {
                return Err(Error::InvalidQuery(format!(
                    "IN on {field:?} needs at least one value"
                )));
            }
            Ok(Predicate::In {
                path: field_path(field)?,
                values: values.iter().map(scalar).collect::<Result<_>>()?,
            })
        }
        Filter::And(children) => Ok(Predicate::And(translate_group("AND", children)?)),
        Filter::Or(children) => Ok(Predicate::Or(translate_group("OR", children)?)),
    }
}

fn translate_group(op: &str, children: &[Filter]) -> Result<Vec<Predicate>> {
    if children.is_empty() {
        return Err(Error::InvalidQuery(format!("{op} needs at least one clause")));
    }
    children.iter().map(translate).collect()
}

/// Split a dotted field into validated path segments
fn field_path(field: &str) -> Result<Vec<String>> {
    let valid = |seg: &str| {
        !seg.is_empty()
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    let path: Vec<String> = field.split('.').map(String::from).collect();
    if !path.iter().all(|seg| valid(seg)) {
        return Err(Error::InvalidQuery(format!("invalid field {field:?}")));
    }
    Ok(path)
}

fn scalar(value: &JsonValue) -> Result<Scalar> {
    Ok(match value {
        JsonValue::Null => Scalar::Null,
        JsonValue::Bool(b) => Scalar::Bool(*b),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Scalar::Int(i),
            (None, Some(f)) => Scalar::Float(f),
            (None, None) => {
                return Err(Error::InvalidQuery(format!("unsupported number {n}")));
            }
        },
        JsonValue::String(s) => Scalar::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            return Err(Error::InvalidQuery(
                "filter operands must be scalars".into(),
            ));
        }
    })
}

fn encode_token(offset: u64) -> String {
    STANDARD.encode(offset.to_string())
}

fn decode_token(token: &str) -> Result<u64> {
    let invalid = || Error::InvalidQuery(format!("invalid continuation token {token:?}"));
    let bytes = STANDARD.decode(token).map_err(|_| invalid())?;
    std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

impl Engine {
    /// Run a structured query.
    ///
    /// The query is fully validated before anything reaches the store.
    /// Rows are decoded through the record codec; binary rows never match a
    /// field filter.
    pub fn query(&self, ctx: &OpContext, query: &Query) -> Result<QueryResponse> {
        let mut spec = query.to_spec(self.inner.live_at())?;
        let page_size = spec.limit;
        // One extra row tells us whether another page exists
        spec.limit = page_size.map(|n| n.saturating_add(1));

        let mut rows = self.inner.in_read_tx(ctx, "query", |tx| {
            tx.execute(Statement::QueryRecords(&spec))?.into_records()
        })?;

        let token = match page_size {
            Some(n) if rows.len() as u64 > n => {
                rows.truncate(n as usize);
                Some(encode_token(spec.offset.saturating_add(n)))
            }
            _ => None,
        };

        let results = rows
            .into_iter()
            .map(|row| {
                let key = row.key.clone();
                let item = decode_row(row)?;
                Ok(QueryItem {
                    key,
                    value: item.value,
                    etag: item.etag,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = results.len(), more = token.is_some(), "query");
        Ok(QueryResponse { results, token })
    }
}
