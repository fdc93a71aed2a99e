//! Provider error types.

use thiserror::Error;

/// Errors a provider call can fail with.
///
/// A missing resource is not an error: `get_*` calls return `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// A create call lost a race with another create of the same name.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// The provider refused the request (quota, authorization, conflict).
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The call did not complete within its time bound.
    #[error("provider call timed out: {0}")]
    Timeout(String),

    /// The request referenced something the provider cannot resolve.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether the same call may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
