use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// The JSON value's inferred lexical type (§4.1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Null,
    Array,
    Object,
    Integer,
}

impl DataType {
    /// Lowercase wire name, used both for JSON (de)serialization and for
    /// `ComputeSchemaHash`'s `key|type|nullable` triples (§4.2).
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Null => "null",
            DataType::Array => "array",
            DataType::Object => "object",
            DataType::Integer => "integer",
        }
    }
}

/// An ordered, deduplicated description of the fields seen in one or more
/// documents (§3). Two schemas with the same `hash` must not coexist; a
/// newly inferred schema whose hash already exists reuses the existing row
/// (P1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: Id,
    pub name: Option<String>,
    /// Deduplication key: `sha256(key|type|nullable ...)`, lowercase hex.
    pub hash: String,
    pub created_utc: DateTime<Utc>,
}

/// One inferred field of a [`Schema`] (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaElement {
    pub id: Id,
    pub schema_id: Id,
    /// Stable ordering within the schema, first-seen order.
    pub position: usize,
    /// Dot-notation path; arrays contribute the base key without an index.
    pub key: String,
    pub data_type: DataType,
    pub nullable: bool,
}
