//! poolgrid-provider: cloud provider abstraction for poolgrid.
//!
//! The reconciler talks to the cloud through one trait, [`ProviderGateway`],
//! which exposes a `get_*` / `create_*` pair per resource kind. Nothing in
//! the reconciler depends on a provider SDK.
//!
//! # Components
//!
//! - **`gateway`**: the `ProviderGateway` trait
//! - **`resources`**: resource specs and the resources the provider returns
//! - **`error`**: `ProviderError`; "not found" is `Ok(None)`, never an error
//! - **`retry`**: backoff policy for retryable provider errors
//! - **`simulated`**: in-memory provider with fault injection and a call journal

pub mod error;
pub mod gateway;
pub mod resources;
pub mod retry;
pub mod simulated;

pub use error::{ProviderError, ProviderResult};
pub use gateway::ProviderGateway;
pub use resources::*;
pub use retry::RetryConfig;
pub use simulated::{CallOp, Fault, FaultMode, ProviderCall, SimulatedProvider};
