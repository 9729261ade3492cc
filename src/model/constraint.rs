use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::Id;

/// Type tag used by [`FieldConstraint`] and the validator (§4.3). Distinct
/// from [`super::schema::DataType`]: there is no `null` tag here because
/// nullability is a separate constraint field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// Expected element type for an array-typed constraint.
pub type ArrayElementType = ConstraintType;

/// A per-field validation rule, unique per `(collection_id, field_path)`
/// (§3). `field_path` may use `[*]` to match every element of an array,
/// e.g. `items[*].name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub id: Id,
    pub collection_id: Id,
    pub field_path: String,
    pub data_type: Option<ConstraintType>,
    pub required: bool,
    pub nullable: bool,
    pub regex_pattern: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub allowed_values: Vec<JsonValue>,
    pub array_element_type: Option<ArrayElementType>,
}

impl FieldConstraint {
    /// A bare constraint with only the path set; callers fill in the
    /// checks they need.
    pub fn new(collection_id: Id, field_path: impl Into<String>) -> Self {
        Self {
            id: Id::new(crate::id::IdKind::FieldConstraint),
            collection_id,
            field_path: field_path.into(),
            data_type: None,
            required: false,
            nullable: true,
            regex_pattern: None,
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
            allowed_values: Vec::new(),
            array_element_type: None,
        }
    }
}

/// Marks one field path as a member of the `Selective` indexing set for a
/// collection (§3). Unique per `(collection_id, field_path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedField {
    pub id: Id,
    pub collection_id: Id,
    pub field_path: String,
}
