//! Repository Port (C1, §6, §9): the sole contract between the engine and
//! a backend. One umbrella trait, eleven narrow sub-traits — one per
//! entity family named in §6 (`Collections, Documents, Schemas,
//! SchemaElements, Values, Labels, Tags, Indexes, FieldConstraints,
//! IndexedFields, ObjectLocks`).
//!
//! The engine never holds rows across a call into this trait and never
//! interpolates a value into a query string — table names are validated by
//! a character allow-list once, at mapping creation, and are the *only*
//! thing ever spliced into SQL text thereafter (§9).

pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::id::Id;
use crate::model::{
    Collection,
    Document,
    FieldConstraint,
    IndexTableMapping,
    IndexedField,
    Label,
    ObjectLock,
    Schema,
    SchemaElement,
    Tag,
};
use crate::search::FilterCondition;

/// Error surface of the Repository Port. `AlreadyExists` is caught by the
/// engine exactly where §5 documents an expected race (schema hash,
/// mapping key, object lock); everything else becomes
/// [`crate::error::LatticeError::Backend`].
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type PortResult<T> = std::result::Result<T, PortError>;

impl From<PortError> for crate::error::LatticeError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound => crate::error::LatticeError::NotFound("entity not found".into()),
            PortError::AlreadyExists => {
                crate::error::LatticeError::Backend(anyhow::anyhow!("unexpected unique conflict"))
            },
            PortError::Backend(err) => crate::error::LatticeError::Backend(err),
        }
    }
}

/// Ordering over a document set, mirroring the wire enumeration of §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    CreatedAscending,
    CreatedDescending,
    LastUpdateAscending,
    LastUpdateDescending,
    NameAscending,
    NameDescending,
}

#[async_trait]
pub trait CollectionsPort: Send + Sync {
    async fn create(&self, collection: &Collection) -> PortResult<()>;
    async fn get(&self, id: &Id) -> PortResult<Option<Collection>>;
    async fn get_by_name(&self, name: &str) -> PortResult<Option<Collection>>;
    /// Cascade-deletes owned Documents, Labels, Tags, FieldConstraints,
    /// IndexedFields, ObjectLocks (§3 ownership).
    async fn delete(&self, id: &Id) -> PortResult<()>;
    async fn update_indexing_mode(&self, id: &Id, mode: crate::model::IndexingMode)
        -> PortResult<()>;
    /// All document ids belonging to the collection, in the requested
    /// order. Used by the search planner's vacuous-filter path (§4.6 step
    /// 5) and the rebuilder's scan phase.
    async fn list_document_ids(&self, collection_id: &Id, order: Ordering) -> PortResult<Vec<Id>>;
}

#[async_trait]
pub trait DocumentsPort: Send + Sync {
    async fn create(&self, document: &Document) -> PortResult<()>;
    async fn get(&self, id: &Id) -> PortResult<Option<Document>>;
    /// Batch fetch, preserving no particular order — callers reorder to
    /// match their own id sequence (§4.6 step 9).
    async fn get_many(&self, ids: &[Id]) -> PortResult<Vec<Document>>;
    async fn list_by_collection(&self, collection_id: &Id) -> PortResult<Vec<Document>>;
    async fn delete(&self, id: &Id) -> PortResult<()>;
}

#[async_trait]
pub trait SchemasPort: Send + Sync {
    async fn get_by_hash(&self, hash: &str) -> PortResult<Option<Schema>>;
    /// `AlreadyExists` on a hash race — the loser reuses the winner's row
    /// (§5).
    async fn create(&self, schema: &Schema) -> PortResult<()>;
    async fn get(&self, id: &Id) -> PortResult<Option<Schema>>;
}

#[async_trait]
pub trait SchemaElementsPort: Send + Sync {
    async fn create_many(&self, elements: &[SchemaElement]) -> PortResult<()>;
    async fn list_by_schema(&self, schema_id: &Id) -> PortResult<Vec<SchemaElement>>;
    async fn get_by_key(&self, schema_id: &Id, key: &str) -> PortResult<Option<SchemaElement>>;
}

#[async_trait]
pub trait IndexesPort: Send + Sync {
    async fn get_mapping(&self, key: &str) -> PortResult<Option<IndexTableMapping>>;
    /// Creates the mapping row *and* the underlying physical table
    /// (`CREATE TABLE IF NOT EXISTS`). `AlreadyExists` on a key race — the
    /// loser proceeds with the winner's mapping (§5).
    async fn create_mapping(&self, mapping: &IndexTableMapping) -> PortResult<()>;
    async fn list_mappings(&self) -> PortResult<Vec<IndexTableMapping>>;
    /// The subset of index table names actually populated by rows
    /// belonging to `collection_id` (§4.4, used by the rebuilder's
    /// Dropping phase).
    async fn populated_tables_for_collection(&self, collection_id: &Id)
        -> PortResult<Vec<String>>;
    /// Deletes every row of `table_name` belonging to `collection_id`.
    /// Returns the number of rows removed.
    async fn drop_rows_for_collection(&self, table_name: &str, collection_id: &Id)
        -> PortResult<u64>;
}

#[async_trait]
pub trait ValuesPort: Send + Sync {
    /// Atomic multi-table insert (§4.4): either every row across every
    /// table lands, or none do.
    async fn insert_values_multi_table(
        &self,
        by_table: BTreeMap<String, Vec<crate::model::DocumentValue>>,
    ) -> PortResult<()>;
    async fn delete_by_document(&self, document_id: &Id, table_names: &[String]) -> PortResult<()>;
    async fn delete_by_collection(&self, collection_id: &Id, table_names: &[String])
        -> PortResult<()>;
    /// Document ids whose rows in `table_name` satisfy `condition`
    /// (OR across value-rows of the same document, per §4.6).
    async fn find_document_ids(
        &self,
        table_name: &str,
        condition: &FilterCondition,
    ) -> PortResult<BTreeSet<Id>>;
}

#[async_trait]
pub trait LabelsPort: Send + Sync {
    async fn create_many(&self, labels: &[Label]) -> PortResult<()>;
    /// Document ids whose label set is a superset of `labels` (AND
    /// semantics, §4.6 step 3), optionally scoped to one collection.
    async fn document_ids_with_labels(
        &self,
        collection_id: Option<&Id>,
        labels: &BTreeSet<String>,
    ) -> PortResult<BTreeSet<Id>>;
    async fn for_document(&self, document_id: &Id) -> PortResult<Vec<Label>>;
    async fn delete_for_document(&self, document_id: &Id) -> PortResult<()>;
}

#[async_trait]
pub trait TagsPort: Send + Sync {
    async fn create_many(&self, tags: &[Tag]) -> PortResult<()>;
    async fn document_ids_with_tags(
        &self,
        collection_id: Option<&Id>,
        tags: &BTreeMap<String, String>,
    ) -> PortResult<BTreeSet<Id>>;
    async fn for_document(&self, document_id: &Id) -> PortResult<Vec<Tag>>;
    async fn delete_for_document(&self, document_id: &Id) -> PortResult<()>;
}

#[async_trait]
pub trait FieldConstraintsPort: Send + Sync {
    async fn list_for_collection(&self, collection_id: &Id) -> PortResult<Vec<FieldConstraint>>;
    async fn upsert(&self, constraint: &FieldConstraint) -> PortResult<()>;
}

#[async_trait]
pub trait IndexedFieldsPort: Send + Sync {
    async fn list_for_collection(&self, collection_id: &Id) -> PortResult<Vec<IndexedField>>;
    async fn upsert(&self, field: &IndexedField) -> PortResult<()>;
}

#[async_trait]
pub trait ObjectLocksPort: Send + Sync {
    /// Inserts the lock row. `Ok(Err(existing))` means a conflicting lock
    /// is already held (§4.9) — the engine surfaces `Conflict`.
    async fn try_acquire(&self, lock: &ObjectLock) -> PortResult<std::result::Result<(), ObjectLock>>;
    async fn release(&self, collection_id: &Id, document_name: &str) -> PortResult<()>;
    async fn release_by_id(&self, id: &Id) -> PortResult<()>;
    async fn delete_expired(&self, older_than_secs: u64) -> PortResult<u64>;
}

/// The umbrella Repository Port: one handle exposing all eleven
/// sub-ports. Statically selected per process (§9) — a single
/// implementation, not virtual dispatch to a backend chosen at runtime.
pub trait RepositoryPort: Send + Sync {
    fn collections(&self) -> &dyn CollectionsPort;
    fn documents(&self) -> &dyn DocumentsPort;
    fn schemas(&self) -> &dyn SchemasPort;
    fn schema_elements(&self) -> &dyn SchemaElementsPort;
    fn indexes(&self) -> &dyn IndexesPort;
    fn values(&self) -> &dyn ValuesPort;
    fn labels(&self) -> &dyn LabelsPort;
    fn tags(&self) -> &dyn TagsPort;
    fn field_constraints(&self) -> &dyn FieldConstraintsPort;
    fn indexed_fields(&self) -> &dyn IndexedFieldsPort;
    fn object_locks(&self) -> &dyn ObjectLocksPort;
}
