use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Metadata row for one persisted JSON document (§3).
///
/// The raw JSON lives on disk at `{documents_directory}/{id}.json` — this
/// struct never carries the JSON body itself. Invariant: `sha256_hash` is
/// the SHA-256 of the UTF-8 bytes of the stored file, and `content_length`
/// is that byte length (checked by [`crate::ingest::Ingestor::ingest`] and
/// re-checked by property test P3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Id,
    pub collection_id: Id,
    pub schema_id: Id,
    pub name: Option<String>,
    pub content_length: u64,
    /// Lowercase hex, 64 characters.
    pub sha256_hash: String,
    pub labels: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}
