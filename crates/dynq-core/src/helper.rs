use serde_json::{Number, Value};

/// Coerce a list operand into its elements.
///
/// Accepts a JSON array, a string holding a JSON array, or a
/// comma-separated string. Other scalars become a one-element list and
/// `null` an empty one. Objects are rejected.
pub fn parse_array(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(_) => None,
        Value::Null => Some(Vec::new()),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed) {
                    return Some(items);
                }
            }
            Some(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(coerce_scalar)
                    .collect(),
            )
        }
        scalar => Some(vec![scalar.clone()]),
    }
}

// numbers only when the text round-trips, so "007" stays a string
fn coerce_scalar(piece: &str) -> Value {
    if let Ok(n) = piece.parse::<i64>() {
        if n.to_string() == piece {
            return Value::from(n);
        }
    }
    if let Ok(f) = piece.parse::<f64>() {
        if f.to_string() == piece {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(piece.to_string())
}

/// Loose boolean reading of a flag value.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "true" | "1" | "yes"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Render a scalar as pattern text.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
