//! Prefix-typed unique identifiers (C2).
//!
//! Every entity in the data model is named `{prefix}_{hex}`, where `hex` is
//! a random v4 UUID rendered without hyphens. Prefixes are part of the
//! wire contract (§6) and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of identifier prefixes, one per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Collection,
    Document,
    Schema,
    SchemaElement,
    DocumentValue,
    Label,
    Tag,
    IndexTableMapping,
    FieldConstraint,
    IndexedField,
    ObjectLock,
}

impl IdKind {
    /// Stable string prefix, as enumerated in spec §6.
    pub const fn prefix(self) -> &'static str {
        match self {
            IdKind::Collection => "col",
            IdKind::Document => "doc",
            IdKind::Schema => "sch",
            IdKind::SchemaElement => "sel",
            IdKind::DocumentValue => "val",
            IdKind::Label => "lbl",
            IdKind::Tag => "tag",
            IdKind::IndexTableMapping => "itm",
            IdKind::FieldConstraint => "fco",
            IdKind::IndexedField => "ixf",
            IdKind::ObjectLock => "lock",
        }
    }
}

/// A generated identifier, e.g. `doc_3f9a1c2b...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Generate a fresh identifier of the given kind.
    pub fn new(kind: IdKind) -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Id(format!("{}_{}", kind.prefix(), raw))
    }

    /// Wrap an existing string without validating its prefix. Used when
    /// reconstructing ids read back from the Repository Port.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Id(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The prefix segment before the first underscore, if any.
    pub fn kind_prefix(&self) -> Option<&str> {
        self.0.split('_').next()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_their_prefix() {
        let id = Id::new(IdKind::Document);
        assert!(id.as_str().starts_with("doc_"));
        assert_eq!(id.kind_prefix(), Some("doc"));
    }

    #[test]
    fn ids_are_unique() {
        let a = Id::new(IdKind::Collection);
        let b = Id::new(IdKind::Collection);
        assert_ne!(a, b);
    }
}
