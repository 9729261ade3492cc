use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// The `key ↔ table_name` row that names a dynamic index table (§3, §4.4).
/// `table_name` is a deterministic function of `key`
/// (`index_{hex(sha256(key))[..N]}`) and must satisfy `^[A-Za-z0-9_]+$` —
/// checked once at creation, then trusted verbatim (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexTableMapping {
    pub id: Id,
    pub key: String,
    pub table_name: String,
}

/// One row of a dynamic per-key index table (§3).
///
/// `position` is `Some(i)` when the value came from the `i`-th element of
/// an array; `value` is the value's lexical string form, matching
/// [`crate::flatten::FlattenedValue::value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentValue {
    pub id: Id,
    pub document_id: Id,
    pub schema_id: Id,
    pub schema_element_id: Option<Id>,
    pub position: Option<u32>,
    pub value: Option<String>,
    pub created_utc: DateTime<Utc>,
}
