//! Request and response types
//!
//! These are the shapes the engine accepts and returns:
//! - [`GetRequest`]: single-key read
//! - [`SetRequest`] / [`DeleteRequest`]: single-key writes, optionally
//!   conditioned on an [`ETag`]
//! - [`TransactionalOperation`]: one step of an atomic multi-key batch
//! - [`StateItem`] / [`BulkGetItem`]: read results
//! - [`Feature`]: capabilities the store advertises

use crate::etag::ETag;
use crate::value::StateValue;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// When a record stops being live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expire at an absolute instant
    At(DateTime<Utc>),
    /// Expire this long after the write, measured with the store's clock
    After(Duration),
}

impl Expiry {
    /// Resolve to Unix millis relative to `now_millis`
    pub fn resolve(&self, now_millis: i64) -> i64 {
        match self {
            Expiry::At(at) => at.timestamp_millis(),
            Expiry::After(ttl) => {
                now_millis.saturating_add(crate::clock::saturating_millis(*ttl))
            }
        }
    }
}

/// Read one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    /// Key to read
    pub key: String,
}

impl GetRequest {
    /// Read `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl From<&str> for GetRequest {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Write one key
///
/// # Example
///
/// ```
/// use statestore_core::{ETag, SetRequest};
/// use std::time::Duration;
///
/// let req = SetRequest::new("order:1", "pending")
///     .ttl(Duration::from_secs(60));
/// assert!(req.etag.is_none());
///
/// let req = req.with_etag(ETag::parse("abc").unwrap());
/// assert!(req.etag.is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    /// Key to write
    pub key: String,
    /// New value
    pub value: StateValue,
    /// First-write-wins when set: only write if the stored etag matches
    pub etag: Option<ETag>,
    /// Expiration; `None` never expires
    pub expiry: Option<Expiry>,
}

impl SetRequest {
    /// Unconditional write that never expires
    pub fn new(key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            etag: None,
            expiry: None,
        }
    }

    /// Condition the write on the stored etag
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Expire at an absolute instant
    pub fn expire_at(mut self, at: DateTime<Utc>) -> Self {
        self.expiry = Some(Expiry::At(at));
        self
    }

    /// Expire a fixed time after the write
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.expiry = Some(Expiry::After(ttl));
        self
    }
}

/// Delete one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Key to delete
    pub key: String,
    /// Only delete if the stored etag matches
    pub etag: Option<ETag>,
}

impl DeleteRequest {
    /// Unconditional, idempotent delete
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            etag: None,
        }
    }

    /// Condition the delete on the stored etag
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = Some(etag);
        self
    }
}

/// One step of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionalOperation {
    /// Insert or update
    Upsert(SetRequest),
    /// Delete
    Delete(DeleteRequest),
}

impl TransactionalOperation {
    /// Key this operation touches
    pub fn key(&self) -> &str {
        match self {
            TransactionalOperation::Upsert(req) => &req.key,
            TransactionalOperation::Delete(req) => &req.key,
        }
    }
}

impl From<SetRequest> for TransactionalOperation {
    fn from(req: SetRequest) -> Self {
        TransactionalOperation::Upsert(req)
    }
}

impl From<DeleteRequest> for TransactionalOperation {
    fn from(req: DeleteRequest) -> Self {
        TransactionalOperation::Delete(req)
    }
}

/// A stored value with its version token
#[derive(Debug, Clone, PartialEq)]
pub struct StateItem {
    /// Decoded value
    pub value: StateValue,
    /// Current version token
    pub etag: ETag,
    /// Expiration, if any
    pub expire_at: Option<DateTime<Utc>>,
}

/// Result for one key of a bulk read
#[derive(Debug, Clone, PartialEq)]
pub struct BulkGetItem {
    /// Requested key
    pub key: String,
    /// Value, `None` if the key is absent or failed to decode
    pub item: Option<StateItem>,
    /// Decode failure for this key only
    pub error: Option<String>,
}

/// Capabilities advertised to the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Conditional writes with etags
    ETag,
    /// Atomic multi-operation transactions
    Transactional,
    /// Structured filter/sort/paginate queries
    QueryApi,
}

impl Feature {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ETag => "ETAG",
            Feature::Transactional => "TRANSACTIONAL",
            Feature::QueryApi => "QUERY_API",
        }
    }
}
