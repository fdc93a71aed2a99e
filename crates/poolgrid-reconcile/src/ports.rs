//! Collaborator seams of the reconciler.
//!
//! The reconciler reads pools through [`PoolStore`] and consults/records
//! steps through [`StepLog`]. Both are implemented by the redb-backed
//! `StateStore`; tests substitute fakes.

use async_trait::async_trait;
use poolgrid_core::Pool;
use poolgrid_state::{StateStore, StepRecord};

use crate::error::ReconcileResult;

/// Source of declared pools.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// `Ok(None)` when the pool id is unknown.
    async fn load_pool(&self, pool_id: &str) -> ReconcileResult<Option<Pool>>;
}

/// Append-only log of completed steps, keyed by `(run_id, step, index)`.
pub trait StepLog: Send + Sync {
    fn lookup(&self, run_id: &str, step: &str, index: u32) -> ReconcileResult<Option<StepRecord>>;

    /// Returns `false` when an entry for the key already exists; the
    /// existing entry is kept.
    fn append(&self, record: &StepRecord) -> ReconcileResult<bool>;
}

#[async_trait]
impl PoolStore for StateStore {
    async fn load_pool(&self, pool_id: &str) -> ReconcileResult<Option<Pool>> {
        Ok(self.get_pool(pool_id)?)
    }
}

impl StepLog for StateStore {
    fn lookup(&self, run_id: &str, step: &str, index: u32) -> ReconcileResult<Option<StepRecord>> {
        Ok(self.get_step(run_id, step, index)?)
    }

    fn append(&self, record: &StepRecord) -> ReconcileResult<bool> {
        Ok(self.append_step(record)?)
    }
}
