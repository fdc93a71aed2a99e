//! Run registry: persisted run status plus the cancellation tokens of
//! runs still in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use poolgrid_core::{RunId, RunPhase, RunRecord, RunReport, ValidationError};
use poolgrid_state::{StateStore, StepRecord};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::cancel::CancelToken;
use crate::error::{ReconcileError, ReconcileResult};

#[derive(Clone)]
pub struct RunRegistry {
    store: StateStore,
    active: Arc<RwLock<HashMap<RunId, CancelToken>>>,
}

impl RunRegistry {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Register `run_id` as in flight and reset its record to `Loading`.
    ///
    /// A run id already in flight is refused. Re-driving a finished run id
    /// is allowed as long as it targets the same pool.
    pub async fn begin(
        &self,
        run_id: &str,
        pool_id: &str,
        cancel: CancelToken,
    ) -> ReconcileResult<()> {
        let mut active = self.active.write().await;
        if active.contains_key(run_id) {
            return Err(ReconcileError::RunAlreadyActive(run_id.to_string()));
        }

        let now = epoch_secs();
        let record = match self.store.get_run(run_id)? {
            Some(existing) if existing.pool_id != pool_id => {
                return Err(ValidationError::new(
                    "run id",
                    format!("'{run_id}' belongs to pool '{}'", existing.pool_id),
                )
                .into());
            }
            Some(mut existing) => {
                info!(run = %run_id, pool = %pool_id, "re-driving run");
                existing.phase = RunPhase::Loading;
                existing.report = None;
                existing.updated_at = now;
                existing
            }
            None => RunRecord::new(run_id, pool_id, now),
        };
        self.store.put_run(&record)?;
        active.insert(run_id.to_string(), cancel);
        Ok(())
    }

    /// Persist a phase change. Store failures are logged, not returned.
    pub async fn set_phase(&self, run_id: &str, phase: RunPhase) {
        if let Err(e) = self.update(run_id, |record| record.phase = phase) {
            error!(run = %run_id, ?phase, error = %e, "failed to persist run phase");
        }
    }

    /// Persist the terminal report and forget the run's cancel token.
    pub async fn finish(&self, report: &RunReport, phase: RunPhase) {
        let result = self.update(&report.run_id, |record| {
            record.phase = phase;
            record.report = Some(report.clone());
        });
        if let Err(e) = result {
            error!(run = %report.run_id, error = %e, "failed to persist run report");
        }
        self.active.write().await.remove(&report.run_id);
    }

    /// Request cancellation of an in-flight run.
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.active.read().await.get(run_id) {
            Some(token) => {
                token.cancel();
                info!(run = %run_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, run_id: &str) -> bool {
        self.active.read().await.contains_key(run_id)
    }

    pub fn status(&self, run_id: &str) -> ReconcileResult<Option<RunRecord>> {
        Ok(self.store.get_run(run_id)?)
    }

    pub fn list(&self) -> ReconcileResult<Vec<RunRecord>> {
        Ok(self.store.list_runs()?)
    }

    pub fn list_for_pool(&self, pool_id: &str) -> ReconcileResult<Vec<RunRecord>> {
        Ok(self.store.list_runs_for_pool(pool_id)?)
    }

    /// Step log entries of a run, oldest first.
    pub fn steps(&self, run_id: &str) -> ReconcileResult<Vec<StepRecord>> {
        Ok(self.store.list_steps_for_run(run_id)?)
    }

    fn update(&self, run_id: &str, apply: impl FnOnce(&mut RunRecord)) -> ReconcileResult<()> {
        let mut record = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| ReconcileError::RunNotFound(run_id.to_string()))?;
        apply(&mut record);
        record.updated_at = epoch_secs();
        self.store.put_run(&record)?;
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
