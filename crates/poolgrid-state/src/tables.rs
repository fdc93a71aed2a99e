//! redb table definitions for the poolgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized types).

use redb::TableDefinition;

/// Pool definitions keyed by pool id.
pub const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");

/// Completed steps keyed by `{run_id}/{step}:{index}`. Append-only.
pub const STEPS: TableDefinition<&str, &[u8]> = TableDefinition::new("steps");

/// Run status records keyed by run id.
pub const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");
