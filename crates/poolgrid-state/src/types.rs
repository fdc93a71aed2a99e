//! Persisted record types owned by the state store.
//!
//! Pools and run records are defined in `poolgrid-core` and re-exported
//! here; the step log entry is specific to storage.

use serde::{Deserialize, Serialize};

pub use poolgrid_core::{Pool, PoolId, RunId, RunPhase, RunRecord, RunReport};

/// One completed step of a run.
///
/// Written once when the step succeeds and never rewritten. A replayed run
/// looks the entry up by `(run_id, step, index)` and reuses `result`
/// instead of calling the provider again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub run_id: RunId,
    /// Logical step name, e.g. `ensure_network`.
    pub step: String,
    /// Instance index for per-instance steps, 0 for run-wide steps.
    pub index: u32,
    /// SHA-256 of the step input at the time it ran.
    pub input_hash: String,
    /// JSON encoding of the step's output.
    pub result: serde_json::Value,
    /// Unix timestamp (seconds) when the step completed.
    pub recorded_at: u64,
}

impl StepRecord {
    /// Build the composite key for the steps table.
    pub fn table_key(&self) -> String {
        step_key(&self.run_id, &self.step, self.index)
    }
}

/// Composite key of a step log entry.
pub fn step_key(run_id: &str, step: &str, index: u32) -> String {
    format!("{run_id}/{step}:{index}")
}
