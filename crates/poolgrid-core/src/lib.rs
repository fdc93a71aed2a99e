//! poolgrid-core: shared types for the poolgrid workspace.
//!
//! - **`types`**: the declared `Pool`, derived `InstanceSpec`s and the
//!   shared `NetworkTopology`
//! - **`run`**: run phases, error kinds, per-instance results and the
//!   terminal `RunReport`
//! - **`naming`**: deterministic resource names and network layout constants
//! - **`hash`**: step input hashing for the replay log
//! - **`config`**: `poolgrid.toml` parsing

pub mod config;
pub mod hash;
pub mod naming;
pub mod run;
pub mod types;

pub use config::PoolgridConfig;
pub use hash::input_hash;
pub use run::*;
pub use types::*;
