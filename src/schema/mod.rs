//! Declarative state schema.
//!
//! A [`Schema`] is a table of field descriptors (name, type, required,
//! default) fixed at startup. Every committed state is checked against it
//! with [`Schema::validate`]; browser-derived fields are filtered with
//! [`Schema::is_valid_field`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::state::{State, Value, VIEW_KEY};

/// Reasons a state does not conform to the schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("[{schema}] missing required field '{field}'")]
    MissingField { schema: String, field: String },

    #[error("[{schema}] field '{field}' expected {expected}, found {found}")]
    WrongType {
        schema: String,
        field: String,
        expected: String,
        found: &'static str,
    },

    #[error("[{schema}] field '{field}' does not allow value '{value}'")]
    NotAllowed {
        schema: String,
        field: String,
        value: String,
    },

    #[error("[{schema}] unknown field '{field}'")]
    UnknownField { schema: String, field: String },
}

/// Type tag of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// A string restricted to a fixed set of values.
    Enum(Vec<String>),
}

impl FieldType {
    /// Whether `value` is an instance of this type.
    ///
    /// Numbers must be finite.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(n)) => n.is_finite(),
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Enum(values), Value::String(s)) => values.iter().any(|v| v == s),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Number => f.write_str("number"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
        }
    }
}

/// Descriptor of one state field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    /// Filled in by [`Schema::apply_defaults`] when the field is absent.
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Strict schema over the application state.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            strict: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|f| f.required)
    }

    /// Whether `key` is declared and `value` has its type.
    pub fn is_valid_field(&self, key: &str, value: &Value) -> bool {
        self.fields.get(key).is_some_and(|f| f.ty.accepts(value))
    }

    /// Check `state` against every descriptor, then reject undeclared keys.
    pub fn validate(&self, state: &State) -> Result<(), ValidationError> {
        for spec in self.fields.values() {
            match state.get(&spec.name) {
                None if spec.required => {
                    return Err(ValidationError::MissingField {
                        schema: self.name.clone(),
                        field: spec.name.clone(),
                    });
                }
                None => {}
                Some(value) if spec.ty.accepts(value) => {}
                Some(value) => return Err(self.type_error(spec, value)),
            }
        }

        if let Some(key) = state.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(ValidationError::UnknownField {
                schema: self.name.clone(),
                field: key.clone(),
            });
        }

        Ok(())
    }

    /// Insert declared defaults for absent fields.
    pub fn apply_defaults(&self, mut state: State) -> State {
        for spec in self.fields.values() {
            if let Some(default) = &spec.default {
                state
                    .entry(spec.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        state
    }

    fn type_error(&self, spec: &FieldSpec, value: &Value) -> ValidationError {
        match (&spec.ty, value) {
            (FieldType::Enum(_), Value::String(s)) => ValidationError::NotAllowed {
                schema: self.name.clone(),
                field: spec.name.clone(),
                value: s.clone(),
            },
            _ => ValidationError::WrongType {
                schema: self.name.clone(),
                field: spec.name.clone(),
                expected: spec.ty.to_string(),
                found: value.type_name(),
            },
        }
    }
}

/// Collects field descriptors and checks the result is a usable strict schema.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    strict: bool,
}

impl SchemaBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn required(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(FieldSpec::required(name, ty))
    }

    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(FieldSpec::optional(name, ty))
    }

    /// Non-strict schemas are rejected by [`SchemaBuilder::build`].
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Checks:
    /// - The schema is strict
    /// - `view` is declared, required, and string-like
    /// - Field names are unique, enums are non-empty, defaults have the field's type
    pub fn build(self) -> Result<Schema, ConfigError> {
        let invalid = |message: String| ConfigError::ValidationError { message };

        if !self.strict {
            return Err(invalid(format!(
                "schema '{}' must be strict",
                self.name
            )));
        }

        let mut fields = BTreeMap::new();
        for spec in self.fields {
            if let FieldType::Enum(values) = &spec.ty {
                if values.is_empty() {
                    return Err(invalid(format!(
                        "field '{}' declares an empty enum",
                        spec.name
                    )));
                }
            }
            if let Some(default) = &spec.default {
                if !spec.ty.accepts(default) {
                    return Err(invalid(format!(
                        "default for field '{}' is not a {}",
                        spec.name, spec.ty
                    )));
                }
            }
            if fields.contains_key(&spec.name) {
                return Err(invalid(format!("field '{}' declared twice", spec.name)));
            }
            fields.insert(spec.name.clone(), spec);
        }

        match fields.get(VIEW_KEY) {
            Some(FieldSpec {
                required: true,
                ty: FieldType::String | FieldType::Enum(_),
                ..
            }) => {}
            _ => {
                return Err(invalid(format!(
                    "schema '{}' must declare a required string field '{}'",
                    self.name, VIEW_KEY
                )))
            }
        }

        Ok(Schema {
            name: self.name,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;

    fn schema() -> Schema {
        Schema::builder("AppState")
            .required("view", FieldType::Enum(vec!["view1".into(), "view2".into()]))
            .optional("foo", FieldType::String)
            .optional("bar", FieldType::Number)
            .optional("flag", FieldType::Boolean)
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_conforming_state() {
        assert!(schema()
            .validate(&state! { "view" => "view1", "bar" => 4, "flag" => true })
            .is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = schema().validate(&state! { "bar" => 4 }).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { field, .. } if field == "view"));
    }

    #[test]
    fn rejects_wrong_type() {
        let err = schema()
            .validate(&state! { "view" => "view1", "bar" => "4" })
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { field, found: "string", .. } if field == "bar"));
    }

    #[test]
    fn rejects_value_outside_enum() {
        let err = schema().validate(&state! { "view" => "nope" }).unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { value, .. } if value == "nope"));
    }

    #[test]
    fn rejects_unknown_field() {
        let err = schema()
            .validate(&state! { "view" => "view1", "extra" => 1 })
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { field, .. } if field == "extra"));
    }

    #[test]
    fn rejects_non_finite_numbers() {
        assert!(schema()
            .validate(&state! { "view" => "view1", "bar" => f64::NAN })
            .is_err());
    }

    #[test]
    fn is_valid_field_checks_declaration_and_type() {
        let s = schema();
        assert!(s.is_valid_field("bar", &Value::from(1)));
        assert!(!s.is_valid_field("bar", &Value::from("1")));
        assert!(!s.is_valid_field("zzz", &Value::from(1)));
    }

    #[test]
    fn apply_defaults_fills_absent_fields_only() {
        let s = Schema::builder("S")
            .required("view", FieldType::String)
            .field(FieldSpec::optional("page", FieldType::Number).with_default(1))
            .build()
            .unwrap();
        assert_eq!(
            s.apply_defaults(state! { "view" => "a" }),
            state! { "view" => "a", "page" => 1 }
        );
        assert_eq!(
            s.apply_defaults(state! { "view" => "a", "page" => 3 }),
            state! { "view" => "a", "page" => 3 }
        );
    }

    #[test]
    fn build_rejects_non_strict_schema() {
        let err = Schema::builder("S")
            .required("view", FieldType::String)
            .strict(false)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must be strict"));
    }

    #[test]
    fn build_requires_view_field() {
        assert!(Schema::builder("S").build().is_err());
        assert!(Schema::builder("S")
            .optional("view", FieldType::String)
            .build()
            .is_err());
        assert!(Schema::builder("S")
            .required("view", FieldType::Number)
            .build()
            .is_err());
    }

    #[test]
    fn build_rejects_duplicates_and_bad_defaults() {
        assert!(Schema::builder("S")
            .required("view", FieldType::String)
            .optional("a", FieldType::String)
            .optional("a", FieldType::Number)
            .build()
            .is_err());
        assert!(Schema::builder("S")
            .required("view", FieldType::String)
            .field(FieldSpec::optional("a", FieldType::Number).with_default("x"))
            .build()
            .is_err());
    }
}
