//! Atomic multi-key batches

use crate::crud::{validate_delete, validate_set};
use crate::engine::{Engine, StoreInner};
use statestore_core::{OpContext, Result, TransactionalOperation};
use statestore_storage::BackendTx;
use tracing::debug;

impl StoreInner {
    /// Apply `ops` in order inside an open transaction; stop at the first
    /// failure
    pub(crate) fn apply_all(
        &self,
        tx: &mut dyn BackendTx,
        ops: &[TransactionalOperation],
    ) -> Result<()> {
        for op in ops {
            match op {
                TransactionalOperation::Upsert(req) => {
                    self.apply_set(tx, req)?;
                }
                TransactionalOperation::Delete(req) => self.apply_delete(tx, req)?,
            }
        }
        Ok(())
    }
}

impl Engine {
    /// Apply upserts and deletes atomically, in the order given.
    ///
    /// Later operations see the effects of earlier ones on the same key.
    /// Any failure rolls back every operation and is returned as-is. An
    /// empty batch does nothing, but is still refused by a read-only store.
    pub fn multi(&self, ctx: &OpContext, ops: &[TransactionalOperation]) -> Result<()> {
        for op in ops {
            match op {
                TransactionalOperation::Upsert(req) => validate_set(req)?,
                TransactionalOperation::Delete(req) => validate_delete(req)?,
            }
        }
        if ops.is_empty() {
            self.inner.ensure_open()?;
            return self.inner.guard.check_write();
        }

        self.inner
            .in_write_tx(ctx, "multi", |tx| self.inner.apply_all(tx, ops))?;
        debug!(count = ops.len(), "multi committed");
        Ok(())
    }
}
