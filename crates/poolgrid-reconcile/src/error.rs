//! Reconciler error types.

use poolgrid_core::{ErrorKind, RunPhase, ValidationError};
use poolgrid_provider::{ProviderError, ResourceKind};
use poolgrid_state::StateError;
use thiserror::Error;

/// Errors raised while reconciling a pool.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(#[from] ValidationError),

    #[error("{kind} '{name}': {source}")]
    Provider {
        kind: ResourceKind,
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("pool store error: {0}")]
    PoolStore(String),

    #[error("step log error: {0}")]
    StepLog(String),

    #[error("run already active: {0}")]
    RunAlreadyActive(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("illegal run transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
}

impl ReconcileError {
    pub fn provider(kind: ResourceKind, name: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            kind,
            name: name.into(),
            source,
        }
    }

    /// The reportable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::PoolNotFound(_) => ErrorKind::PoolNotFound,
            ReconcileError::Configuration(_) => ErrorKind::ConfigurationError,
            ReconcileError::Provider {
                source: ProviderError::Timeout(_),
                ..
            } => ErrorKind::ProviderTimeout,
            ReconcileError::Provider { .. } => ErrorKind::ProviderError,
            ReconcileError::Cancelled => ErrorKind::Cancelled,
            ReconcileError::State(_) | ReconcileError::PoolStore(_) | ReconcileError::StepLog(_) => {
                ErrorKind::StoreError
            }
            ReconcileError::RunAlreadyActive(_)
            | ReconcileError::RunNotFound(_)
            | ReconcileError::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
