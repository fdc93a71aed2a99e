//! Replay guard around reconciliation steps.
//!
//! Every step runs through [`RunJournal::step`]. If the step log already
//! holds a result for `(run_id, step, index)` recorded from the same input,
//! that result is returned and the step body never runs. Otherwise the body
//! runs and, on success, its result is appended. Failed steps are not
//! recorded, so a re-driven run retries them.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use poolgrid_core::{RunId, input_hash};
use poolgrid_state::StepRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::ports::StepLog;

/// Logical step names as they appear in the step log.
pub mod steps {
    pub const LOAD_POOL: &str = "load_pool";
    pub const RESOURCE_GROUP: &str = "ensure_resource_group";
    pub const NETWORK: &str = "ensure_network";
    pub const PUBLIC_IP: &str = "ensure_public_ip";
    pub const PUBLIC_NIC: &str = "ensure_public_nic";
    pub const GAME_NIC: &str = "ensure_game_nic";
    pub const INSTANCE: &str = "ensure_instance";
}

/// Step log view scoped to one run.
#[derive(Clone)]
pub struct RunJournal {
    run_id: RunId,
    log: Arc<dyn StepLog>,
}

impl RunJournal {
    pub fn new(run_id: impl Into<RunId>, log: Arc<dyn StepLog>) -> Self {
        Self {
            run_id: run_id.into(),
            log,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run `body` unless a matching result is already recorded.
    pub async fn step<I, T, F, Fut>(
        &self,
        step: &str,
        index: u32,
        input: &I,
        body: F,
    ) -> ReconcileResult<T>
    where
        I: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReconcileResult<T>>,
    {
        let hash = input_hash(input).map_err(|e| ReconcileError::StepLog(e.to_string()))?;

        if let Some(record) = self.log.lookup(&self.run_id, step, index)? {
            if record.input_hash == hash {
                match serde_json::from_value(record.result) {
                    Ok(value) => {
                        debug!(run = %self.run_id, step, index, "replayed recorded step");
                        return Ok(value);
                    }
                    Err(e) => warn!(
                        run = %self.run_id,
                        step,
                        index,
                        error = %e,
                        "recorded step result unreadable, running step again"
                    ),
                }
            } else {
                warn!(
                    run = %self.run_id,
                    step,
                    index,
                    "step input changed since it was recorded, running step again"
                );
            }
        }

        let value = body().await?;

        let record = StepRecord {
            run_id: self.run_id.clone(),
            step: step.to_string(),
            index,
            input_hash: hash,
            result: serde_json::to_value(&value)
                .map_err(|e| ReconcileError::StepLog(e.to_string()))?,
            recorded_at: epoch_secs(),
        };
        if !self.log.append(&record)? {
            debug!(run = %self.run_id, step, index, "step already recorded, keeping first entry");
        }
        Ok(value)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_state::StateStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn journal(run_id: &str) -> (RunJournal, StateStore) {
        let store = StateStore::open_in_memory().unwrap();
        (RunJournal::new(run_id, Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn recorded_step_is_not_run_again() {
        let (journal, store) = journal("r1");
        let runs = AtomicU32::new(0);

        for _ in 0..2 {
            let value: String = journal
                .step("ensure_thing", 0, "input", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok("created".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "created");
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_steps_for_run("r1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_step_is_not_recorded() {
        let (journal, store) = journal("r1");
        let result: ReconcileResult<String> = journal
            .step("ensure_thing", 0, "input", || async { Err(ReconcileError::Cancelled) })
            .await;
        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert!(store.get_step("r1", "ensure_thing", 0).unwrap().is_none());
    }

    #[tokio::test]
    async fn changed_input_runs_again_and_keeps_first_entry() {
        let (journal, store) = journal("r1");
        let _: u32 = journal
            .step("ensure_thing", 0, "old", || async { Ok(1) })
            .await
            .unwrap();
        let second: u32 = journal
            .step("ensure_thing", 0, "new", || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(second, 2);

        let record = store.get_step("r1", "ensure_thing", 0).unwrap().unwrap();
        assert_eq!(record.result, serde_json::json!(1));
        assert_eq!(record.input_hash, input_hash("old").unwrap());
    }

    #[tokio::test]
    async fn steps_are_scoped_by_run_and_index() {
        let store = StateStore::open_in_memory().unwrap();
        let log: Arc<dyn StepLog> = Arc::new(store.clone());
        let first = RunJournal::new("r1", Arc::clone(&log));
        let other = RunJournal::new("r2", log);

        let _: u32 = first.step("s", 0, "x", || async { Ok(1) }).await.unwrap();
        let b: u32 = first.step("s", 1, "x", || async { Ok(2) }).await.unwrap();
        let c: u32 = other.step("s", 0, "x", || async { Ok(3) }).await.unwrap();
        assert_eq!((b, c), (2, 3));
        assert_eq!(store.list_steps_for_run("r1").unwrap().len(), 2);
    }
}
