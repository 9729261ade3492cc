//! JSON Flattener (C3, §4.1).
//!
//! Recursively decomposes a JSON document into an ordered list of
//! `(key, position, value, type)` tuples. Array descents never inject an
//! index segment into the key (`tags[2].name` flattens to key `tags.name`,
//! position `2`) — the position always reflects the *innermost* enclosing
//! array, so a value nested inside an array element's sub-object still
//! carries that array's index.
//!
//! The flattener is total: it never fails on well-formed JSON (there is no
//! `Result` in its signature).

use serde_json::Value as JsonValue;

use crate::model::DataType;

/// One leaf tuple produced by [`flatten`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedValue {
    /// Dot-notation path from the document root.
    pub key: String,
    /// 0-based index in the innermost enclosing array, if any.
    pub position: Option<u32>,
    /// Lexical form of the value. `None` for JSON `null` and for the
    /// presence-only rows emitted by empty arrays/objects.
    pub value: Option<String>,
    pub data_type: DataType,
}

/// Flatten a parsed JSON value into its depth-first leaf tuples,
/// preserving object member insertion order.
pub fn flatten(root: &JsonValue) -> Vec<FlattenedValue> {
    let mut out = Vec::new();
    walk(String::new(), None, root, &mut out);
    out
}

fn walk(key: String, position: Option<u32>, value: &JsonValue, out: &mut Vec<FlattenedValue>) {
    match value {
        JsonValue::Object(map) => {
            if map.is_empty() {
                out.push(FlattenedValue {
                    key,
                    position,
                    value: None,
                    data_type: DataType::Object,
                });
                return;
            }
            for (member_key, member_value) in map {
                let child_key = join(&key, member_key);
                walk(child_key, position, member_value, out);
            }
        },
        JsonValue::Array(items) => {
            if items.is_empty() {
                out.push(FlattenedValue {
                    key,
                    position,
                    value: None,
                    data_type: DataType::Array,
                });
                return;
            }
            for (index, item) in items.iter().enumerate() {
                walk(key.clone(), Some(index as u32), item, out);
            }
        },
        JsonValue::Null => out.push(FlattenedValue {
            key,
            position,
            value: None,
            data_type: DataType::Null,
        }),
        JsonValue::Bool(b) => out.push(FlattenedValue {
            key,
            position,
            value: Some(b.to_string()),
            data_type: DataType::Boolean,
        }),
        JsonValue::Number(n) => out.push(FlattenedValue {
            key,
            position,
            value: Some(n.to_string()),
            data_type: number_type(n),
        }),
        JsonValue::String(s) => out.push(FlattenedValue {
            key,
            position,
            value: Some(s.clone()),
            data_type: DataType::String,
        }),
    }
}

fn join(prefix: &str, member_key: &str) -> String {
    if prefix.is_empty() {
        member_key.to_string()
    } else {
        format!("{}.{}", prefix, member_key)
    }
}

/// A number is `integer` when it has no fractional component, `number`
/// otherwise — resolved per-tuple here so the schema inferencer (C4) can
/// simply collapse a key's tuple types per its own rule.
fn number_type(n: &serde_json::Number) -> DataType {
    if n.is_i64() || n.is_u64() {
        return DataType::Integer;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => DataType::Integer,
        _ => DataType::Number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_object_fields_have_no_position() {
        let doc = json!({"name": "A"});
        let flat = flatten(&doc);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].key, "name");
        assert_eq!(flat[0].position, None);
        assert_eq!(flat[0].value.as_deref(), Some("A"));
        assert_eq!(flat[0].data_type, DataType::String);
    }

    #[test]
    fn array_elements_record_position_without_index_segment() {
        let doc = json!({"name": "A", "tags": ["x", "y"]});
        let flat = flatten(&doc);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[1].key, "tags");
        assert_eq!(flat[1].position, Some(0));
        assert_eq!(flat[1].value.as_deref(), Some("x"));
        assert_eq!(flat[2].key, "tags");
        assert_eq!(flat[2].position, Some(1));
        assert_eq!(flat[2].value.as_deref(), Some("y"));
    }

    #[test]
    fn nested_object_inside_array_element_inherits_position() {
        let doc = json!({"items": [{"name": "first"}, {"name": "second"}]});
        let flat = flatten(&doc);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].key, "items.name");
        assert_eq!(flat[0].position, Some(0));
        assert_eq!(flat[1].key, "items.name");
        assert_eq!(flat[1].position, Some(1));
    }

    #[test]
    fn empty_array_and_object_emit_presence_rows() {
        let doc = json!({"a": [], "b": {}});
        let flat = flatten(&doc);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].data_type, DataType::Array);
        assert_eq!(flat[0].value, None);
        assert_eq!(flat[1].data_type, DataType::Object);
        assert_eq!(flat[1].value, None);
    }

    #[test]
    fn null_emits_null_type_with_no_value() {
        let doc = json!({"x": null});
        let flat = flatten(&doc);
        assert_eq!(flat[0].data_type, DataType::Null);
        assert_eq!(flat[0].value, None);
    }

    #[test]
    fn integer_valued_numbers_are_tagged_integer() {
        let doc = json!({"count": 3, "ratio": 3.5, "whole_float": 4.0});
        let flat = flatten(&doc);
        assert_eq!(flat[0].data_type, DataType::Integer);
        assert_eq!(flat[1].data_type, DataType::Number);
        assert_eq!(flat[2].data_type, DataType::Integer);
    }

    #[test]
    fn preserves_object_member_insertion_order() {
        let doc = json!({"z": 1, "a": 2, "m": 3});
        let flat = flatten(&doc);
        let keys: Vec<&str> = flat.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
