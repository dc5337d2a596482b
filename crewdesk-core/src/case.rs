//! Field-name conversion between the wire format (snake_case) and the
//! application format (camelCase).
//!
//! Only object keys are rewritten. Array elements and nested objects are
//! visited recursively; primitive leaves are returned untouched.

use serde_json::{Map, Value};

/// `"created_at"` -> `"createdAt"`. Leading underscores are preserved.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    let mut seen_word = false;
    for ch in key.chars() {
        if ch == '_' || ch == '-' {
            if seen_word {
                upper_next = true;
            } else {
                out.push(ch);
            }
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
        seen_word = true;
    }
    out
}

/// `"createdAt"` -> `"created_at"`.
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert every object key from wire format to application format.
pub fn camelize(value: Value) -> Value {
    convert_keys(value, to_camel_case)
}

/// Convert every object key from application format to wire format.
pub fn decamelize(value: Value) -> Value {
    convert_keys(value, to_snake_case)
}

fn convert_keys(value: Value, convert: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let converted: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (convert(&k), convert_keys(v, convert)))
                .collect();
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert_keys(item, convert))
                .collect(),
        ),
        leaf => leaf,
    }
}
