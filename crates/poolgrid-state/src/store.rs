//! StateStore: redb-backed state persistence for poolgrid.
//!
//! Provides typed operations over pools, the step log and run records. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Every table maps string keys to JSON bytes.
type StrTable = redb::TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POOLS).map_err(map_err!(Table))?;
        txn.open_table(STEPS).map_err(map_err!(Table))?;
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Pools ──────────────────────────────────────────────────────

    /// Insert or update a pool definition.
    pub fn put_pool(&self, pool: &Pool) -> StateResult<()> {
        self.put(POOLS, &pool.id, pool)?;
        debug!(pool = %pool.id, "pool stored");
        Ok(())
    }

    /// Get a pool by id.
    pub fn get_pool(&self, id: &str) -> StateResult<Option<Pool>> {
        self.get(POOLS, id)
    }

    /// List all pools.
    pub fn list_pools(&self) -> StateResult<Vec<Pool>> {
        self.scan(POOLS, "")
    }

    /// Delete a pool by id. Returns true if it existed.
    pub fn delete_pool(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POOLS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pool = %id, existed, "pool deleted");
        Ok(existed)
    }

    // ── Step log ───────────────────────────────────────────────────

    /// Append a completed step.
    ///
    /// The log is append-only: if an entry already exists for the same
    /// `(run_id, step, index)` it is left untouched and `false` is returned.
    pub fn append_step(&self, record: &StepRecord) -> StateResult<bool> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let appended;
        {
            let mut table = txn.open_table(STEPS).map_err(map_err!(Table))?;
            let exists = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if exists {
                appended = false;
            } else {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                appended = true;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, appended, "step recorded");
        Ok(appended)
    }

    /// Look up the recorded step for `(run_id, step, index)`.
    pub fn get_step(&self, run_id: &str, step: &str, index: u32) -> StateResult<Option<StepRecord>> {
        self.get(STEPS, &step_key(run_id, step, index))
    }

    /// All recorded steps of a run, oldest first.
    pub fn list_steps_for_run(&self, run_id: &str) -> StateResult<Vec<StepRecord>> {
        let mut steps: Vec<StepRecord> = self.scan(STEPS, &format!("{run_id}/"))?;
        // Run ids may contain '/', so the prefix also matches nested ids.
        steps.retain(|s| s.run_id == run_id);
        steps.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.index.cmp(&b.index))
                .then_with(|| a.step.cmp(&b.step))
        });
        Ok(steps)
    }

    // ── Runs ───────────────────────────────────────────────────────

    /// Insert or update a run record.
    pub fn put_run(&self, run: &RunRecord) -> StateResult<()> {
        self.put(RUNS, &run.run_id, run)?;
        debug!(run = %run.run_id, phase = ?run.phase, "run stored");
        Ok(())
    }

    /// Get a run record by id.
    pub fn get_run(&self, run_id: &str) -> StateResult<Option<RunRecord>> {
        self.get(RUNS, run_id)
    }

    /// List all run records, newest first.
    pub fn list_runs(&self) -> StateResult<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self.scan(RUNS, "")?;
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    /// List the run records of one pool, newest first.
    pub fn list_runs_for_pool(&self, pool_id: &str) -> StateResult<Vec<RunRecord>> {
        let mut runs = self.list_runs()?;
        runs.retain(|r| r.pool_id == pool_id);
        Ok(runs)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put<T: Serialize>(
        &self,
        table_def: StrTable,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table_def: StrTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Every value whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(
        &self,
        table_def: StrTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_core::{ErrorKind, RunPhase};
    use std::collections::BTreeMap;

    fn test_pool(id: &str, count: u32) -> Pool {
        Pool {
            id: id.to_string(),
            resource_group_name: format!("rg-{id}"),
            location: "westeurope".to_string(),
            desired_vm_count: count,
            vnet_name: None,
            dual_homed: true,
            vm_size: "Standard_D3_v2".to_string(),
            admin_username: "poolgrid".to_string(),
            admin_credentials_ref: "vault://admin".to_string(),
            tags: BTreeMap::new(),
        }
    }

    fn test_step(run_id: &str, step: &str, index: u32, recorded_at: u64) -> StepRecord {
        StepRecord {
            run_id: run_id.to_string(),
            step: step.to_string(),
            index,
            input_hash: "abc".to_string(),
            result: serde_json::json!({ "id": format!("{step}-{index}") }),
            recorded_at,
        }
    }

    // ── Pools ──────────────────────────────────────────────────────

    #[test]
    fn pool_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let pool = test_pool("eu-1", 3);

        store.put_pool(&pool).unwrap();
        assert_eq!(store.get_pool("eu-1").unwrap(), Some(pool));
    }

    #[test]
    fn pool_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_pool("missing").unwrap().is_none());
    }

    #[test]
    fn pool_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut pool = test_pool("eu-1", 3);
        store.put_pool(&pool).unwrap();

        pool.desired_vm_count = 5;
        store.put_pool(&pool).unwrap();

        let retrieved = store.get_pool("eu-1").unwrap().unwrap();
        assert_eq!(retrieved.desired_vm_count, 5);
        assert_eq!(store.list_pools().unwrap().len(), 1);
    }

    #[test]
    fn pool_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pool(&test_pool("eu-1", 1)).unwrap();

        assert!(store.delete_pool("eu-1").unwrap());
        assert!(!store.delete_pool("eu-1").unwrap());
        assert!(store.get_pool("eu-1").unwrap().is_none());
    }

    // ── Step log ───────────────────────────────────────────────────

    #[test]
    fn step_append_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let step = test_step("run-1", "ensure_network", 0, 100);

        assert!(store.append_step(&step).unwrap());
        assert_eq!(
            store.get_step("run-1", "ensure_network", 0).unwrap(),
            Some(step)
        );
        assert!(store.get_step("run-1", "ensure_network", 1).unwrap().is_none());
    }

    #[test]
    fn step_log_is_append_only() {
        let store = StateStore::open_in_memory().unwrap();
        let original = test_step("run-1", "ensure_public_ip", 2, 100);
        assert!(store.append_step(&original).unwrap());

        let mut rewrite = original.clone();
        rewrite.result = serde_json::json!({ "id": "other" });
        assert!(!store.append_step(&rewrite).unwrap());

        let kept = store.get_step("run-1", "ensure_public_ip", 2).unwrap().unwrap();
        assert_eq!(kept.result, original.result);
    }

    #[test]
    fn steps_are_scoped_to_their_run() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_step(&test_step("run-1", "ensure_resource_group", 0, 100)).unwrap();
        store.append_step(&test_step("run-1", "ensure_network", 0, 101)).unwrap();
        store.append_step(&test_step("run-10", "ensure_network", 0, 102)).unwrap();

        let steps = store.list_steps_for_run("run-1").unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, vec!["ensure_resource_group", "ensure_network"]);
    }

    #[test]
    fn steps_of_nested_run_ids_stay_separate() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_step(&test_step("nightly", "ensure_network", 0, 100)).unwrap();
        store.append_step(&test_step("nightly/2", "ensure_network", 0, 101)).unwrap();

        let steps = store.list_steps_for_run("nightly").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].run_id, "nightly");
        assert_eq!(store.list_steps_for_run("nightly/2").unwrap().len(), 1);
    }

    // ── Runs ───────────────────────────────────────────────────────

    #[test]
    fn run_put_get_and_update() {
        let store = StateStore::open_in_memory().unwrap();
        let mut run = RunRecord::new("run-1", "eu-1", 100);
        store.put_run(&run).unwrap();

        run.phase = RunPhase::Failed;
        run.report = Some(RunReport::failed(
            "run-1",
            "eu-1",
            ErrorKind::ProviderError,
            "quota",
            100,
            110,
        ));
        run.updated_at = 110;
        store.put_run(&run).unwrap();

        let retrieved = store.get_run("run-1").unwrap().unwrap();
        assert_eq!(retrieved.phase, RunPhase::Failed);
        assert!(retrieved.report.is_some());
    }

    #[test]
    fn runs_list_newest_first_and_by_pool() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_run(&RunRecord::new("a", "eu-1", 100)).unwrap();
        store.put_run(&RunRecord::new("b", "us-1", 200)).unwrap();
        store.put_run(&RunRecord::new("c", "eu-1", 300)).unwrap();

        let all: Vec<String> = store.list_runs().unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(all, vec!["c", "b", "a"]);

        let eu: Vec<String> = store
            .list_runs_for_pool("eu-1")
            .unwrap()
            .into_iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(eu, vec!["c", "a"]);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_pool(&test_pool("eu-1", 2)).unwrap();
            store.append_step(&test_step("run-1", "ensure_network", 0, 100)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_pool("eu-1").unwrap().unwrap().desired_vm_count, 2);
        assert!(store.get_step("run-1", "ensure_network", 0).unwrap().is_some());
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_pools().unwrap().is_empty());
        assert!(store.list_runs().unwrap().is_empty());
        assert!(store.list_steps_for_run("any").unwrap().is_empty());
        assert!(store.get_run("nope").unwrap().is_none());
        assert!(!store.delete_pool("nope").unwrap());
    }
}
