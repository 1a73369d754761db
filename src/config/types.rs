use serde::{Deserialize, Serialize};

use crate::state::{Value, VIEW_KEY};

/// Root settings container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub schema: SchemaSettings,
    /// Path patterns, tried in order.
    #[serde(default)]
    pub paths: Vec<PathSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How long a queued transition waits for a browser confirmation
    /// before the queue is forced (default: 200).
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSettings {
    #[serde(default = "default_schema_name")]
    pub name: String,
    /// Must stay `true`; kept so a non-strict declaration is reported, not ignored.
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSettings {
    pub name: String,
    /// Field type: "string", "number", "boolean", "enum".
    #[serde(rename = "type")]
    pub type_str: String,
    #[serde(default)]
    pub required: bool,
    /// Allowed values, for "enum" fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// One path pattern, e.g. `view = "user"`, `pattern = "user/:userId"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    pub view: String,
    pub pattern: String,
}

fn default_flush_timeout_ms() -> u64 {
    200
}

fn default_schema_name() -> String {
    "AppState".to_string()
}

fn default_strict() -> bool {
    true
}

fn default_fields() -> Vec<FieldSettings> {
    vec![FieldSettings {
        name: VIEW_KEY.to_string(),
        type_str: "string".to_string(),
        required: true,
        values: Vec::new(),
        default: None,
    }]
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            name: default_schema_name(),
            strict: default_strict(),
            fields: default_fields(),
        }
    }
}
