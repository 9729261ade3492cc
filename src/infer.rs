//! Schema Inferencer (C4, §4.2).
//!
//! Reduces a flattened document's tuples to an ordered, deduplicated list
//! of [`InferredElement`]s plus a stable hash. The hash is the dedup key:
//! [`crate::model::Schema`] rows are reused across documents that infer to
//! the same ordered element list (P1).

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::flatten::FlattenedValue;
use crate::model::DataType;

/// One field inferred from a document's flattened tuples, prior to being
/// persisted as a [`crate::model::SchemaElement`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferredElement {
    pub position: usize,
    pub key: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// The result of inference: the ordered elements and their hash.
#[derive(Debug, Clone)]
pub struct InferredSchema {
    pub elements: Vec<InferredElement>,
    pub hash: String,
}

/// Group flattened tuples by key (first-seen order), resolve each key's
/// type and nullability, and compute the schema hash.
pub fn infer(tuples: &[FlattenedValue]) -> InferredSchema {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<&str, Vec<DataType>> = HashMap::new();

    for tuple in tuples {
        let types = by_key.entry(tuple.key.as_str()).or_insert_with(|| {
            order.push(tuple.key.clone());
            Vec::new()
        });
        types.push(tuple.data_type);
    }

    let elements: Vec<InferredElement> = order
        .into_iter()
        .enumerate()
        .map(|(position, key)| {
            let types = &by_key[key.as_str()];
            let (data_type, nullable) = resolve_type(types);
            InferredElement {
                position,
                key,
                data_type,
                nullable,
            }
        })
        .collect();

    let hash = compute_schema_hash(&elements);
    InferredSchema { elements, hash }
}

/// Resolve a key's tuple types to a single `(data_type, nullable)` pair
/// per §4.2:
///
/// - if all non-null tuples agree, use that type;
/// - else if every non-null tuple is numeric (`integer`/`number`), the
///   mix collapses to `number` (agreement already handled the all-integer
///   case above);
/// - else the heterogeneous non-null types collapse to `string`;
/// - `nullable` is set whenever any tuple was `null`, and a key observed
///   only as `null` resolves its own type to `null`.
fn resolve_type(types: &[DataType]) -> (DataType, bool) {
    let nullable = types.contains(&DataType::Null);
    let non_null: Vec<DataType> = types
        .iter()
        .copied()
        .filter(|t| *t != DataType::Null)
        .collect();

    let Some(&first) = non_null.first() else {
        return (DataType::Null, true);
    };
    if non_null.iter().all(|t| *t == first) {
        return (first, nullable);
    }
    let all_numeric = non_null
        .iter()
        .all(|t| matches!(t, DataType::Integer | DataType::Number));
    if all_numeric {
        return (DataType::Number, nullable);
    }
    (DataType::String, nullable)
}

/// `ComputeSchemaHash`: concatenate `key|type|nullable` triples in their
/// emitted order, separated by `\n`, and SHA-256 the UTF-8 bytes.
pub fn compute_schema_hash(elements: &[InferredElement]) -> String {
    let mut hasher = Sha256::new();
    let joined = elements
        .iter()
        .map(|e| format!("{}|{}|{}", e.key, e.data_type.as_str(), e.nullable))
        .collect::<Vec<_>>()
        .join("\n");
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use serde_json::json;

    #[test]
    fn groups_by_key_and_resolves_agreeing_type() {
        let doc = json!({"name": "A", "tags": ["x", "y"]});
        let inferred = infer(&flatten(&doc));
        assert_eq!(inferred.elements.len(), 2);
        assert_eq!(inferred.elements[0].key, "name");
        assert_eq!(inferred.elements[0].data_type, DataType::String);
        assert!(!inferred.elements[0].nullable);
        assert_eq!(inferred.elements[1].key, "tags");
        assert_eq!(inferred.elements[1].data_type, DataType::String);
    }

    #[test]
    fn mixed_integer_and_number_collapses_to_number() {
        let doc = json!({"values": [1, 2.5]});
        let inferred = infer(&flatten(&doc));
        assert_eq!(inferred.elements[0].data_type, DataType::Number);
    }

    #[test]
    fn all_integer_values_resolve_to_integer() {
        let doc = json!({"values": [1, 2, 3]});
        let inferred = infer(&flatten(&doc));
        assert_eq!(inferred.elements[0].data_type, DataType::Integer);
    }

    #[test]
    fn heterogeneous_types_collapse_to_string() {
        let doc = json!({"values": [1, "two", true]});
        let inferred = infer(&flatten(&doc));
        assert_eq!(inferred.elements[0].data_type, DataType::String);
    }

    #[test]
    fn null_alongside_a_type_sets_nullable() {
        let doc = json!({"values": [1, null]});
        let inferred = infer(&flatten(&doc));
        assert_eq!(inferred.elements[0].data_type, DataType::Integer);
        assert!(inferred.elements[0].nullable);
    }

    #[test]
    fn same_shape_produces_same_hash_regardless_of_document_instance() {
        let a = infer(&flatten(&json!({"name": "A", "age": 1})));
        let b = infer(&flatten(&json!({"name": "B", "age": 2})));
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn different_key_order_in_source_changes_hash() {
        // Per P2, the hash is a pure function of *emission* order, which
        // for an object mirrors insertion order; reordering members of
        // the source document therefore changes the hash.
        let a = infer(&flatten(&json!({"a": 1, "b": 2})));
        let b = infer(&flatten(&json!({"b": 2, "a": 1})));
        assert_ne!(a.hash, b.hash);
    }
}
