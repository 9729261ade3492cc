use serde::{Deserialize, Serialize};

use crate::id::Id;

/// A free-form label attached to a collection and/or a document (§3). At
/// least one of `collection_id`/`document_id` is set; a document-level
/// label carries both (so collection-scoped label search can join
/// directly on `collection_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: Id,
    pub collection_id: Option<Id>,
    pub document_id: Option<Id>,
    pub label_value: String,
}

/// A `key = value` tag attached to a collection and/or a document (§3).
/// Same duality as [`Label`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub collection_id: Option<Id>,
    pub document_id: Option<Id>,
    pub key: String,
    pub value: String,
}
