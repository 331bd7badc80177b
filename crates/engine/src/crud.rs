//! Single-key and bulk reads and writes
//!
//! Writes with an etag are compare-and-swap at the statement level: the
//! conditional UPDATE/DELETE touches zero rows when the stored etag differs
//! or the key is absent, and that surfaces as [`Error::ETagMismatch`].

use crate::engine::{Engine, StoreInner};
use statestore_core::codec;
use statestore_core::{
    clock, BulkGetItem, DeleteRequest, ETag, Error, GetRequest, OpContext, Result, SetRequest,
    StateItem,
};
use statestore_storage::{BackendTx, RecordRow, RecordWrite, Statement};
use tracing::debug;

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidRequest("key must not be empty".into()));
    }
    Ok(())
}

fn validate_etag(etag: Option<&ETag>) -> Result<()> {
    match etag {
        Some(etag) if etag.as_str().is_empty() => {
            Err(Error::InvalidRequest("etag must not be empty".into()))
        }
        _ => Ok(()),
    }
}

/// Decode a stored row into the caller-facing item
pub(crate) fn decode_row(row: RecordRow) -> Result<StateItem> {
    let value = codec::decode(&row.value, row.is_binary).map_err(|e| e.with_key(&row.key))?;
    Ok(StateItem {
        value,
        etag: ETag::from_stored(row.etag),
        expire_at: row.expire_at_ms.and_then(clock::from_millis),
    })
}

impl StoreInner {
    /// Write one record inside an open transaction
    pub(crate) fn apply_set(&self, tx: &mut dyn BackendTx, req: &SetRequest) -> Result<ETag> {
        let encoded = codec::encode(&req.value).map_err(|e| e.with_key(&req.key))?;
        let now = self.clock.now_millis();
        let etag = ETag::generate();
        let write = RecordWrite {
            key: &req.key,
            value: &encoded.bytes,
            is_binary: encoded.is_binary,
            etag: etag.as_str(),
            expire_at_ms: req.expiry.map(|expiry| expiry.resolve(now)),
            update_at_ms: now,
        };

        let stmt = match &req.etag {
            Some(expected) => Statement::UpdateRecordIfEtag {
                write,
                expected_etag: expected.as_str(),
            },
            None => Statement::UpsertRecord(write),
        };
        let affected = tx.execute(stmt)?.into_affected()?;
        if req.etag.is_some() && affected == 0 {
            return Err(Error::ETagMismatch {
                key: req.key.clone(),
            });
        }
        Ok(etag)
    }

    /// Delete one record inside an open transaction
    pub(crate) fn apply_delete(&self, tx: &mut dyn BackendTx, req: &DeleteRequest) -> Result<()> {
        let stmt = match &req.etag {
            Some(expected) => Statement::DeleteRecordIfEtag {
                key: &req.key,
                expected_etag: expected.as_str(),
            },
            None => Statement::DeleteRecord { key: &req.key },
        };
        let affected = tx.execute(stmt)?.into_affected()?;
        if req.etag.is_some() && affected == 0 {
            return Err(Error::ETagMismatch {
                key: req.key.clone(),
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_set(req: &SetRequest) -> Result<()> {
    validate_key(&req.key)?;
    validate_etag(req.etag.as_ref())
}

pub(crate) fn validate_delete(req: &DeleteRequest) -> Result<()> {
    validate_key(&req.key)?;
    validate_etag(req.etag.as_ref())
}

impl Engine {
    /// Read one key.
    ///
    /// Fails with [`Error::NotFound`] if the key is absent. Rows whose
    /// expiration has passed but which have not been swept yet are returned
    /// unless the store filters expired rows on read.
    pub fn get(&self, ctx: &OpContext, req: &GetRequest) -> Result<StateItem> {
        validate_key(&req.key)?;
        let live_at_ms = self.inner.live_at();
        let row = self.inner.in_read_tx(ctx, "get", |tx| {
            tx.execute(Statement::GetRecord {
                key: &req.key,
                live_at_ms,
            })?
            .into_record()
        })?;

        match row {
            Some(row) => decode_row(row),
            None => Err(Error::NotFound {
                key: req.key.clone(),
            }),
        }
    }

    /// Write one key and return its new etag
    pub fn set(&self, ctx: &OpContext, req: &SetRequest) -> Result<ETag> {
        validate_set(req)?;
        let etag = self
            .inner
            .in_write_tx(ctx, "set", |tx| self.inner.apply_set(tx, req))?;
        debug!(key = %req.key, conditional = req.etag.is_some(), "set");
        Ok(etag)
    }

    /// Delete one key. Deleting an absent key without an etag succeeds.
    pub fn delete(&self, ctx: &OpContext, req: &DeleteRequest) -> Result<()> {
        validate_delete(req)?;
        self.inner
            .in_write_tx(ctx, "delete", |tx| self.inner.apply_delete(tx, req))?;
        debug!(key = %req.key, conditional = req.etag.is_some(), "delete");
        Ok(())
    }

    /// Read many keys in one transaction.
    ///
    /// Missing keys yield an item without a value. A row that fails to
    /// decode is reported on its item; a backend failure fails the call.
    pub fn bulk_get(&self, ctx: &OpContext, reqs: &[GetRequest]) -> Result<Vec<BulkGetItem>> {
        for req in reqs {
            validate_key(&req.key)?;
        }
        if reqs.is_empty() {
            return Ok(Vec::new());
        }

        let live_at_ms = self.inner.live_at();
        let rows = self.inner.in_read_tx(ctx, "bulk_get", |tx| {
            reqs.iter()
                .map(|req| {
                    tx.execute(Statement::GetRecord {
                        key: &req.key,
                        live_at_ms,
                    })?
                    .into_record()
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(reqs
            .iter()
            .zip(rows)
            .map(|(req, row)| {
                let (item, error) = match row.map(decode_row).transpose() {
                    Ok(item) => (item, None),
                    Err(e) => (None, Some(e.to_string())),
                };
                BulkGetItem {
                    key: req.key.clone(),
                    item,
                    error,
                }
            })
            .collect())
    }

    /// Write many keys atomically.
    ///
    /// The first failing item rolls back the whole batch and its error
    /// names that item's key.
    pub fn bulk_set(&self, ctx: &OpContext, reqs: &[SetRequest]) -> Result<()> {
        for req in reqs {
            validate_set(req)?;
        }
        self.inner.in_write_tx(ctx, "bulk_set", |tx| {
            for req in reqs {
                self.inner.apply_set(tx, req)?;
            }
            Ok(())
        })?;
        debug!(count = reqs.len(), "bulk set");
        Ok(())
    }

    /// Delete many keys atomically
    pub fn bulk_delete(&self, ctx: &OpContext, reqs: &[DeleteRequest]) -> Result<()> {
        for req in reqs {
            validate_delete(req)?;
        }
        self.inner.in_write_tx(ctx, "bulk_delete", |tx| {
            for req in reqs {
                self.inner.apply_delete(tx, req)?;
            }
            Ok(())
        })?;
        debug!(count = reqs.len(), "bulk delete");
        Ok(())
    }
}
