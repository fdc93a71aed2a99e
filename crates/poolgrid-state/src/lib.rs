//! poolgrid-state: embedded state store for poolgrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the declared pools, the
//! append-only step log used to replay runs, and run status records.
//!
//! # Architecture
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. Step
//! log keys are `{run_id}/{step}:{index}` so a run's history is one prefix
//! scan away.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
