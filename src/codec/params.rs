//! Parameter codec: typed state values to and from query-string parameters.
//!
//! Parsing is driven by the schema's declared type for each key. A value
//! that does not parse as its declared type is dropped from the result,
//! never inserted as a placeholder.

use std::collections::BTreeMap;

use crate::schema::{FieldType, Schema};
use crate::state::{State, Value};

/// Raw string parameters, as read from or written to a URL.
pub type Params = BTreeMap<String, String>;

/// Canonical string form of a number.
///
/// Integral values have no fractional part (`4`, not `4.0`) and negative
/// zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Parse a number only if it prints back to exactly `raw`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let n = raw.parse::<f64>().ok()?;
    (n.is_finite() && format_number(n) == raw).then_some(n)
}

pub fn parse_boolean(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Convert every value to its canonical string.
pub fn stringify(state: &State) -> Params {
    state
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect()
}

/// Convert parameters back to typed values using the schema.
///
/// Undeclared keys and string-like fields pass through as strings.
pub fn parse(schema: &Schema, params: &Params) -> State {
    params
        .iter()
        .filter_map(|(key, raw)| {
            let value = match schema.field(key).map(|f| &f.ty) {
                Some(FieldType::Number) => Value::Number(parse_number(raw)?),
                Some(FieldType::Boolean) => Value::Bool(parse_boolean(raw)?),
                _ => Value::String(raw.clone()),
            };
            Some((key.clone(), value))
        })
        .collect()
}
