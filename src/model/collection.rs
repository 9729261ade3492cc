use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LatticeError, Result};
use crate::id::{Id, IdKind};

/// Governs how [`crate::validate`] applies `FieldConstraint`s during ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaEnforcementMode {
    /// No validation is performed.
    None,
    /// Every present field must match a constraint; unconstrained fields
    /// are rejected.
    Strict,
    /// Constrained fields are checked, but an unconstrained field is
    /// allowed through.
    Flexible,
    /// Like `Flexible`, but required-field checks only apply to fields
    /// that have a constraint at all.
    Partial,
}

/// Governs which flattened fields [`crate::catalog`] indexes during ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingMode {
    /// Every inferred field is indexed.
    All,
    /// Only fields present in the collection's `IndexedField` set are
    /// indexed.
    Selective,
    /// No per-field indexing; documents are still stored and searchable by
    /// label/tag.
    None,
}

/// A logical container of documents with a shared directory and policy
/// (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    /// Filesystem directory backing this collection's raw JSON blobs. Must
    /// exist on disk (invariant).
    pub documents_directory: PathBuf,
    pub schema_enforcement_mode: SchemaEnforcementMode,
    pub indexing_mode: IndexingMode,
    pub labels: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}

impl Collection {
    /// Construct a new collection, validating the invariants from §3:
    /// `name` non-empty, `documents_directory` exists on disk.
    pub fn new(
        name: impl Into<String>,
        documents_directory: PathBuf,
        schema_enforcement_mode: SchemaEnforcementMode,
        indexing_mode: IndexingMode,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LatticeError::InvalidArgument(
                "collection name must not be empty".into(),
            ));
        }
        if !documents_directory.exists() {
            return Err(LatticeError::InvalidArgument(format!(
                "documents_directory {:?} does not exist",
                documents_directory
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: Id::new(IdKind::Collection),
            name,
            description: None,
            documents_directory,
            schema_enforcement_mode,
            indexing_mode,
            labels: BTreeSet::new(),
            tags: BTreeMap::new(),
            created_utc: now,
            last_update_utc: now,
        })
    }

    /// Path of the on-disk blob for a document id belonging to this
    /// collection (§6: `{documents_directory}/{document.id}.json`).
    pub fn document_path(&self, document_id: &Id) -> PathBuf {
        self.documents_directory
            .join(format!("{}.json", document_id.as_str()))
    }
}
