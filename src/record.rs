// 🧾 Raw Records - what a record source hands to the engine
// Field name → untyped scalar, in the order the source produced them

use serde_json::{Map, Value};

/// One ingested log line/row.
///
/// Keys keep source order (serde_json `preserve_order`). A field can be
/// absent, present with `Null`, or carry a bool/number/string. Nested JSON
/// values pass through untouched; validators treat them as "not a string".
pub type RawRecord = Map<String, Value>;

/// True when `field` is absent from the record or explicitly null.
///
/// Shared by the required-field check and the null-rate computation so the
/// two can never disagree on what "missing" means.
pub fn is_missing(record: &RawRecord, field: &str) -> bool {
    matches!(record.get(field), None | Some(Value::Null))
}

/// Short JSON type name for diagnostics
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a value for a diagnostic message, cut to `max_chars` characters.
pub fn preview_value(value: &Value, max_chars: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() <= max_chars {
        text
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

// ============================================================================
// TESTS
// ============================================================================
