use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::params::format_number;

/// A scalar state value.
///
/// State is flat: every key maps to a string, a number or a boolean.
/// Numbers compare with IEEE semantics, so `NaN` never equals itself
/// and `0.0` equals `-0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of the value's type, used in validation errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

/// Canonical string form, as written into the query string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_canonical() {
        assert_eq!(Value::from(4).to_string(), "4");
        assert_eq!(Value::from(0.5).to_string(), "0.5");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from("a b").to_string(), "a b");
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(2).as_f64(), Some(2.0));
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert_eq!(Value::from(2).as_str(), None);
        assert_eq!(Value::from("x").type_name(), "string");
    }
}
