//! The data model (§3): Collection, Document, Schema, SchemaElement,
//! IndexTableMapping, DocumentValue, Label, Tag, FieldConstraint,
//! IndexedField, ObjectLock.
//!
//! Lifetimes form a tree rooted at `Collection` (cascade delete owns
//! Documents, Labels, Tags, FieldConstraints, IndexedFields, ObjectLocks).
//! `Schema` is reference-counted by Documents and is never garbage
//! collected by the engine (§9).

mod collection;
mod constraint;
mod document;
mod index;
mod label_tag;
mod lock;
mod schema;

pub use collection::{Collection, IndexingMode, SchemaEnforcementMode};
pub use constraint::{ArrayElementType, ConstraintType, FieldConstraint, IndexedField};
pub use document::Document;
pub use index::{DocumentValue, IndexTableMapping};
pub use label_tag::{Label, Tag};
pub use lock::ObjectLock;
pub use schema::{DataType, Schema, SchemaElement};
