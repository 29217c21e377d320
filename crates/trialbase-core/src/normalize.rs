//! Field normalization for aggregate payloads.
//!
//! Incoming aggregate payloads are loosely typed JSON: clients send
//! comma-separated strings where the schema wants arrays, arrays where it
//! wants strings, and raw numbers or booleans where it wants text. These
//! helpers coerce named fields in place before the record store sees them.

use serde_json::{Map, Value as JsonValue};

/// Coerce the named fields of a JSON object into arrays of strings.
///
/// - a string splits on commas (items trimmed)
/// - a scalar becomes a one-element array
/// - existing arrays have their elements stringified
///
/// Fields that are absent or null are left untouched.
pub fn ensure_array_fields(payload: &mut Map<String, JsonValue>, fields: &[&str]) {
    for &field in fields {
        let Some(value) = payload.get(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let items: Vec<JsonValue> = match value {
            JsonValue::String(s) => s
                .split(',')
                .map(|item| JsonValue::String(item.trim().to_string()))
                .collect(),
            JsonValue::Array(items) => items.iter().map(|v| stringified(v)).collect(),
            other => vec![stringified(other)],
        };
        payload.insert(field.to_string(), JsonValue::Array(items));
    }
}

/// Coerce the named fields of a JSON object into plain strings.
///
/// Arrays join with `", "`; scalars stringify. Absent/null fields are left
/// untouched.
pub fn ensure_string_fields(payload: &mut Map<String, JsonValue>, fields: &[&str]) {
    for &field in fields {
        let Some(value) = payload.get(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let coerced = match value {
            JsonValue::Array(items) => items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
            other => scalar_to_string(other),
        };
        payload.insert(field.to_string(), JsonValue::String(coerced));
    }
}

fn stringified(value: &JsonValue) -> JsonValue {
    JsonValue::String(scalar_to_string(value))
}

/// Render a scalar JSON value as the string the text column should hold.
pub fn scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_comma_separated_string_splits_into_array() {
        let mut payload = obj(json!({"countries": "US, UK ,Germany"}));
        ensure_array_fields(&mut payload, &["countries"]);
        assert_eq!(payload["countries"], json!(["US", "UK", "Germany"]));
    }

    #[test]
    fn test_scalar_becomes_single_element_array() {
        let mut payload = obj(json!({"reference_links": 42}));
        ensure_array_fields(&mut payload, &["reference_links"]);
        assert_eq!(payload["reference_links"], json!(["42"]));
    }

    #[test]
    fn test_array_elements_are_stringified() {
        let mut payload = obj(json!({"trial_identifier": ["NCT001", 7, true]}));
        ensure_array_fields(&mut payload, &["trial_identifier"]);
        assert_eq!(payload["trial_identifier"], json!(["NCT001", "7", "true"]));
    }

    #[test]
    fn test_array_joins_into_string() {
        let mut payload = obj(json!({"primary_drugs": ["Drug A", "Drug B"]}));
        ensure_string_fields(&mut payload, &["primary_drugs"]);
        assert_eq!(payload["primary_drugs"], json!("Drug A, Drug B"));
    }

    #[test]
    fn test_bool_and_number_stringify_for_text_fields() {
        let mut payload = obj(json!({"healthy_volunteers": true, "age_from": 18}));
        ensure_string_fields(&mut payload, &["healthy_volunteers", "age_from"]);
        assert_eq!(payload["healthy_volunteers"], json!("true"));
        assert_eq!(payload["age_from"], json!("18"));
    }

    #[test]
    fn test_absent_and_null_fields_untouched() {
        let mut payload = obj(json!({"region": null}));
        ensure_array_fields(&mut payload, &["region", "countries"]);
        ensure_string_fields(&mut payload, &["region", "countries"]);
        assert_eq!(payload["region"], JsonValue::Null);
        assert!(!payload.contains_key("countries"));
    }
}
