//! Engine-wide configuration.
//!
//! A plain data bag, not a subsystem: Lattice core never reads environment
//! variables or config files itself (CLI/config parsing is an external
//! collaborator, per spec). Callers construct an [`EngineConfig`] and pass
//! it to the entry points that need it.

use serde::{Deserialize, Serialize};

/// Tunable knobs that apply across all collections, as opposed to the
/// per-collection policy fields (`schema_enforcement_mode`,
/// `indexing_mode`, ...) that live on [`crate::model::Collection`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of hex characters of `sha256(key)` used to build an index
    /// table name (`index_{hash}`). Fixed per process; changing it after
    /// data has been written orphans existing mappings.
    pub index_table_hash_len: usize,

    /// Upper clamp applied to `SearchQuery::max_results` regardless of what
    /// the caller requests.
    pub max_results_ceiling: u32,

    /// Default `expiration_seconds` used by [`crate::lockreg::ObjectLockRegistry::delete_expired`]
    /// when the caller does not specify one.
    pub default_lock_expiration_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_table_hash_len: 16,
            max_results_ceiling: 1000,
            default_lock_expiration_secs: 300,
        }
    }
}
