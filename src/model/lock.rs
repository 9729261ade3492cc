use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// A mutual-exclusion row for one `(collection, document_name)` pair
/// (§3, §4.9). Existence of the row *is* the lock: `Free → Held → Free`,
/// with `Free → Held` atomic (unique constraint) and `Held → Free`
/// idempotent (delete-if-exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectLock {
    pub id: Id,
    pub collection_id: Id,
    pub document_name: String,
    pub hostname: String,
    pub created_utc: DateTime<Utc>,
}
