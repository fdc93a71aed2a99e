//! Run-level types: phases, error kinds, per-instance results and reports.
//!
//! These are persisted by the state store and returned verbatim by the
//! status API, so they are all plain serializable data.

use serde::{Deserialize, Serialize};

use crate::types::PoolId;

/// Unique identifier of one reconciliation run.
pub type RunId = String;

/// Phase of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Reading the pool from the store.
    Loading,
    /// Ensuring the resource group exists.
    EnsuringGroup,
    /// Ensuring security groups, virtual network and subnets exist.
    EnsuringNetwork,
    /// Instance tasks are running.
    Provisioning,
    /// All instance tasks are terminal; building the report.
    Joining,
    /// Run finished; the report may still be partial.
    Completed,
    /// Run aborted by a run-level error.
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

/// Classification of every failure a run can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The pool id is unknown to the pool store.
    PoolNotFound,
    /// Identity fields were missing or invalid; nothing was sent to the provider.
    ConfigurationError,
    /// The provider rejected a call for a reason other than "not found".
    ProviderError,
    /// The provider did not answer within the call timeout and the retry
    /// budget ran out.
    ProviderTimeout,
    /// The run was cancelled before the step issued its mutating call.
    Cancelled,
    /// The pool store or the step log failed.
    StoreError,
    /// An instance task ended without producing a result.
    Internal,
}

/// Why one instance failed: the step that failed and its error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFailure {
    pub step: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one instance provisioning task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub index: u32,
    pub instance_name: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<InstanceFailure>,
}

impl ProvisioningResult {
    pub fn succeeded(
        index: u32,
        instance_name: impl Into<String>,
        resource_id: impl Into<String>,
        public_ip_address: Option<String>,
    ) -> Self {
        Self {
            index,
            instance_name: instance_name.into(),
            succeeded: true,
            resource_id: Some(resource_id.into()),
            public_ip_address,
            failure: None,
        }
    }

    pub fn failed(index: u32, instance_name: impl Into<String>, failure: InstanceFailure) -> Self {
        Self {
            index,
            instance_name: instance_name.into(),
            succeeded: false,
            resource_id: None,
            public_ip_address: None,
            failure: Some(failure),
        }
    }
}

/// Overall status of a terminal run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every instance succeeded.
    Success,
    /// Some instances failed; the run still completed.
    Partial { failed_indices: Vec<u32> },
    /// A run-level error aborted the run before or during network setup.
    Failed { kind: ErrorKind, message: String },
}

/// Terminal summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub pool_id: PoolId,
    /// One entry per instance index, in index order.
    pub instances: Vec<ProvisioningResult>,
    pub outcome: RunOutcome,
    pub started_at: u64,
    pub finished_at: u64,
}

impl RunReport {
    /// Aggregate instance results collected at the join barrier.
    ///
    /// Results are re-ordered by index, so the report does not depend on
    /// the order in which tasks finished.
    pub fn from_results(
        run_id: &str,
        pool_id: &str,
        mut instances: Vec<ProvisioningResult>,
        started_at: u64,
        finished_at: u64,
    ) -> Self {
        instances.sort_by_key(|r| r.index);
        let failed_indices: Vec<u32> = instances
            .iter()
            .filter(|r| !r.succeeded)
            .map(|r| r.index)
            .collect();
        let outcome = if failed_indices.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial { failed_indices }
        };
        Self {
            run_id: run_id.to_string(),
            pool_id: pool_id.to_string(),
            instances,
            outcome,
            started_at,
            finished_at,
        }
    }

    /// Report for a run aborted by a run-level error.
    pub fn failed(
        run_id: &str,
        pool_id: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        started_at: u64,
        finished_at: u64,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            pool_id: pool_id.to_string(),
            instances: Vec::new(),
            outcome: RunOutcome::Failed {
                kind,
                message: message.into(),
            },
            started_at,
            finished_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Indices of failed instances, empty unless the outcome is partial.
    pub fn failed_indices(&self) -> &[u32] {
        match &self.outcome {
            RunOutcome::Partial { failed_indices } => failed_indices,
            _ => &[],
        }
    }
}

/// Persisted status of a run, as returned by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub pool_id: PoolId,
    pub phase: RunPhase,
    /// Present once `phase` is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RunRecord {
    pub fn new(run_id: &str, pool_id: &str, now: u64) -> Self {
        Self {
            run_id: run_id.to_string(),
            pool_id: pool_id.to_string(),
            phase: RunPhase::Loading,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }
}
