//! poolgrid-reconcile: converges a declared pool onto the provider.
//!
//! # Components
//!
//! - **`ensure`**: idempotent get-or-create per resource kind
//! - **`call`**: per-call timeout, retry budget and cancellation checks
//! - **`journal`**: step log replay guard keyed by `(run, step, index)`
//! - **`instance`**: public IP → NIC(s) → VM for one instance
//! - **`machine`**: run phase transitions
//! - **`reconciler`**: run orchestration and bounded instance fan-out
//! - **`registry`**: run status and in-flight cancellation tokens
//! - **`ports`**: pool store and step log seams

pub mod call;
pub mod cancel;
pub mod ensure;
pub mod error;
pub mod instance;
pub mod journal;
pub mod machine;
pub mod plan;
pub mod ports;
pub mod reconciler;
pub mod registry;

pub use call::StepEnv;
pub use cancel::CancelToken;
pub use error::{ReconcileError, ReconcileResult};
pub use journal::{RunJournal, steps};
pub use machine::RunMachine;
pub use ports::{PoolStore, StepLog};
pub use reconciler::{ReconcileSettings, Reconciler};
pub use registry::RunRegistry;
