//! Schema Validator (C5, §4.3).
//!
//! Checks a JSON document against a collection's [`FieldConstraint`]s under
//! an [`SchemaEnforcementMode`]. Short-circuits to success when the mode is
//! `None` or there are no constraints at all.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{ConstraintType, FieldConstraint, SchemaEnforcementMode};

/// One of the error codes enumerated in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    MissingRequiredField,
    UnexpectedField,
    TypeMismatch,
    NullNotAllowed,
    PatternMismatch,
    ValueTooSmall,
    ValueTooLarge,
    StringTooShort,
    StringTooLong,
    ArrayTooShort,
    ArrayTooLong,
    ValueNotAllowed,
    InvalidArrayElement,
}

/// One validation failure, scoped to the field path that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_path: String,
    pub code: ValidationErrorCode,
    pub message: String,
    pub actual: Option<String>,
    pub expected: Option<String>,
}

impl ValidationError {
    fn new(
        field_path: impl Into<String>,
        code: ValidationErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            code,
            message: message.into(),
            actual: None,
            expected: None,
        }
    }

    fn with_actual_expected(mut self, actual: Option<String>, expected: Option<String>) -> Self {
        self.actual = actual;
        self.expected = expected;
        self
    }
}

/// Validate `json_text` against `constraints` under `mode`. Returns the
/// full list of violations rather than stopping at the first one, so a
/// caller building a `SchemaValidationError` sees everything at once.
pub fn validate(
    json_text: &str,
    mode: SchemaEnforcementMode,
    constraints: &[FieldConstraint],
) -> Result<(), Vec<ValidationError>> {
    if mode == SchemaEnforcementMode::None || constraints.is_empty() {
        return Ok(());
    }

    let value: JsonValue = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(_) => {
            return Err(vec![ValidationError::new(
                "",
                ValidationErrorCode::TypeMismatch,
                "document is not valid JSON",
            )])
        },
    };

    let mut present = Vec::new();
    collect_present_paths(String::new(), &value, &mut present);
    let present_paths: Vec<&str> = present.iter().map(|(p, _)| p.as_str()).collect();

    let mut errors = Vec::new();

    if mode != SchemaEnforcementMode::Partial {
        for constraint in constraints.iter().filter(|c| c.required) {
            let satisfied = present_paths
                .iter()
                .any(|p| path_matches(&constraint.field_path, p));
            if !satisfied {
                errors.push(ValidationError::new(
                    constraint.field_path.clone(),
                    ValidationErrorCode::MissingRequiredField,
                    format!("required field {} is missing", constraint.field_path),
                ));
            }
        }
    }

    for (path, val) in &present {
        match find_constraint(path, constraints) {
            Some(constraint) => apply_checks(path, val, constraint, &mut errors),
            None if mode == SchemaEnforcementMode::Strict => {
                errors.push(ValidationError::new(
                    path.clone(),
                    ValidationErrorCode::UnexpectedField,
                    format!("field {path} is not declared by any constraint"),
                ));
            },
            None => {},
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collect `(path, value)` for every leaf and every empty array/object,
/// mirroring the flattener's notion of "presence" but keeping array
/// indices in the path (`items[0].name`) rather than dropping them.
fn collect_present_paths<'a>(
    path: String,
    value: &'a JsonValue,
    out: &mut Vec<(String, &'a JsonValue)>,
) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_present_paths(child_path, child, out);
            }
        },
        JsonValue::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                collect_present_paths(format!("{path}[{index}]"), item, out);
            }
        },
        _ => out.push((path, value)),
    }
}

fn index_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d+\]").expect("static pattern"))
}

/// A present path matches a constraint path either literally, or as the
/// array-expansion of a `[*]` wildcard (`items[*].name` matches
/// `items[0].name`).
fn path_matches(constraint_path: &str, present_path: &str) -> bool {
    if constraint_path == present_path {
        return true;
    }
    if !constraint_path.contains("[*]") {
        return false;
    }
    let mut pattern = String::from("^");
    for (i, part) in constraint_path.split("[*]").enumerate() {
        if i > 0 {
            pattern.push_str(r"\[\d+\]");
        }
        pattern.push_str(&regex::escape(part));
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map(|re| re.is_match(present_path))
        .unwrap_or(false)
}

fn find_constraint<'a>(
    present_path: &str,
    constraints: &'a [FieldConstraint],
) -> Option<&'a FieldConstraint> {
    let stripped = index_segment_re().replace_all(present_path, "").to_string();
    constraints.iter().find(|c| {
        c.field_path == present_path
            || c.field_path == stripped
            || path_matches(&c.field_path, present_path)
    })
}

fn type_matches(expected: ConstraintType, value: &JsonValue) -> bool {
    match expected {
        ConstraintType::String => value.is_string(),
        ConstraintType::Boolean => value.is_boolean(),
        ConstraintType::Array => value.is_array(),
        ConstraintType::Object => value.is_object(),
        ConstraintType::Integer => value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
        ConstraintType::Number => value.is_number(),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn apply_checks(
    path: &str,
    value: &JsonValue,
    constraint: &FieldConstraint,
    errors: &mut Vec<ValidationError>,
) {
    if value.is_null() {
        if !constraint.nullable {
            errors.push(ValidationError::new(
                path,
                ValidationErrorCode::NullNotAllowed,
                format!("{path} may not be null"),
            ));
        }
        return;
    }

    if let Some(expected) = constraint.data_type {
        if !type_matches(expected, value) {
            errors.push(
                ValidationError::new(
                    path,
                    ValidationErrorCode::TypeMismatch,
                    format!("{path} has the wrong type"),
                )
                .with_actual_expected(
                    Some(json_type_name(value).to_string()),
                    Some(format!("{expected:?}").to_lowercase()),
                ),
            );
        }
    }

    if let (Some(pattern), Some(s)) = (&constraint.regex_pattern, value.as_str()) {
        if let Ok(re) = Regex::new(pattern) {
            if !re.is_match(s) {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorCode::PatternMismatch,
                    format!("{path} does not match pattern {pattern}"),
                ));
            }
        }
    }

    if let (Some(min), Some(n)) = (constraint.min_value, value.as_f64()) {
        if n < min {
            errors.push(ValidationError::new(
                path,
                ValidationErrorCode::ValueTooSmall,
                format!("{path} is below the minimum of {min}"),
            ));
        }
    }
    if let (Some(max), Some(n)) = (constraint.max_value, value.as_f64()) {
        if n > max {
            errors.push(ValidationError::new(
                path,
                ValidationErrorCode::ValueTooLarge,
                format!("{path} exceeds the maximum of {max}"),
            ));
        }
    }

    if let Some(min_len) = constraint.min_length {
        match value {
            JsonValue::String(s) if s.chars().count() < min_len => {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorCode::StringTooShort,
                    format!("{path} is shorter than {min_len} characters"),
                ));
            },
            JsonValue::Array(a) if a.len() < min_len => {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorCode::ArrayTooShort,
                    format!("{path} has fewer than {min_len} elements"),
                ));
            },
            _ => {},
        }
    }
    if let Some(max_len) = constraint.max_length {
        match value {
            JsonValue::String(s) if s.chars().count() > max_len => {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorCode::StringTooLong,
                    format!("{path} is longer than {max_len} characters"),
                ));
            },
            JsonValue::Array(a) if a.len() > max_len => {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorCode::ArrayTooLong,
                    format!("{path} has more than {max_len} elements"),
                ));
            },
            _ => {},
        }
    }

    if !constraint.allowed_values.is_empty() && !constraint.allowed_values.contains(value) {
        errors.push(ValidationError::new(
            path,
            ValidationErrorCode::ValueNotAllowed,
            format!("{path} is not one of the allowed values"),
        ));
    }

    if let Some(element_type) = constraint.array_element_type {
        if let JsonValue::Array(items) = value {
            for (index, item) in items.iter().enumerate() {
                if !type_matches(element_type, item) {
                    errors.push(ValidationError::new(
                        format!("{path}[{index}]"),
                        ValidationErrorCode::InvalidArrayElement,
                        format!("{path}[{index}] does not match the declared element type"),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;

    fn constraint(field_path: &str) -> FieldConstraint {
        FieldConstraint::new(Id::from_raw("col_test"), field_path)
    }

    #[test]
    fn strict_mode_flags_missing_required_and_unexpected_fields() {
        let mut name_constraint = constraint("name");
        name_constraint.required = true;
        name_constraint.data_type = Some(ConstraintType::String);
        name_constraint.max_length = Some(10);
        name_constraint.nullable = false;

        let errors =
            validate(r#"{"extra":1}"#, SchemaEnforcementMode::Strict, &[name_constraint.clone()])
                .unwrap_err();
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&ValidationErrorCode::MissingRequiredField));
        assert!(codes.contains(&ValidationErrorCode::UnexpectedField));

        let errors = validate(
            r#"{"name":"VeryLongName"}"#,
            SchemaEnforcementMode::Strict,
            &[name_constraint],
        )
        .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationErrorCode::StringTooLong));
    }

    #[test]
    fn flexible_mode_does_not_reject_unconstrained_fields() {
        let mut name_constraint = constraint("name");
        name_constraint.required = true;
        assert!(validate(
            r#"{"name":"A","extra":1}"#,
            SchemaEnforcementMode::Flexible,
            &[name_constraint]
        )
        .is_ok());
    }

    #[test]
    fn partial_mode_skips_required_check() {
        let mut name_constraint = constraint("name");
        name_constraint.required = true;
        assert!(validate(r#"{}"#, SchemaEnforcementMode::Partial, &[name_constraint]).is_ok());
    }

    #[test]
    fn wildcard_constraint_matches_every_array_element() {
        let mut c = constraint("items[*].name");
        c.data_type = Some(ConstraintType::String);
        let errors = validate(
            r#"{"items":[{"name":"a"},{"name":1}]}"#,
            SchemaEnforcementMode::Flexible,
            &[c],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field_path, "items[1].name");
    }

    #[test]
    fn none_mode_always_succeeds() {
        let mut c = constraint("name");
        c.required = true;
        assert!(validate(r#"{}"#, SchemaEnforcementMode::None, &[c]).is_ok());
    }
}
