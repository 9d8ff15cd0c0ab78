//! Record normalization before persistence.
//!
//! Two independent transforms, composable in either order:
//! - [`serialize_nested`] turns a raw JSON object into a [`Record`] of
//!   scalars, storing arrays and objects as their JSON text.
//! - [`camel_case_fields`] rewrites `snake_case` field names to `camelCase`.
//!
//! [`normalize`] applies both.

use serde_json::Value;

use crate::models::{FieldValue, RawRecord, Record};

/// Serialize nested values and camel-case field names.
pub fn normalize(records: Vec<RawRecord>) -> Vec<Record> {
    records
        .into_iter()
        .map(|raw| camel_case_fields(serialize_nested(raw)))
        .collect()
}

/// Append `key = value` to every raw record, replacing any existing value.
pub fn stamp(records: &mut [RawRecord], key: &str, value: &Value) {
    for record in records.iter_mut() {
        record.insert(key.to_string(), value.clone());
    }
}

/// Convert a raw object into scalar fields, keeping field order.
pub fn serialize_nested(raw: RawRecord) -> Record {
    raw.into_iter()
        .map(|(key, value)| (key, to_field_value(value)))
        .collect()
}

fn to_field_value(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => FieldValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => FieldValue::Text(nested.to_string()),
    }
}

/// Rename every field with [`camel_case`]. When two names collide the
/// later field's value wins, at the position of the first.
pub fn camel_case_fields(record: Record) -> Record {
    let mut renamed = Record::with_capacity(record.len());
    for (key, value) in record {
        renamed.insert(camel_case(&key), value);
    }
    renamed
}

/// `parent_name` → `parentName`.
///
/// Splits on `_`; the first part is kept verbatim, each later part gets an
/// uppercase first letter and lowercase remainder. Names without `_` are
/// returned unchanged.
pub fn camel_case(name: &str) -> String {
    let mut parts = name.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}
