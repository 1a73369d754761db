use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::codec::{PathCodec, PathPattern};
use crate::config::types::{FieldSettings, Settings};
use crate::schema::{FieldSpec, FieldType, Schema};
use crate::state::VIEW_KEY;

/// Errors that can occur when loading settings or declaring a schema.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Settings validation failed: {message}")]
    ValidationError { message: String },
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// - If the file doesn't exist, returns `Settings::default()`.
    /// - Otherwise parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parses and validates settings held in memory.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<memory>"),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// Checks:
    /// - The flush timeout is positive
    /// - The schema builds (see [`SchemaBuilder::build`](crate::schema::SchemaBuilder::build))
    /// - Every path pattern parses and names a declared view
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.flush_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "flush_timeout_ms must be greater than zero".to_string(),
            });
        }

        let schema = self.schema()?;
        self.path_codec()?;

        if let Some(FieldType::Enum(views)) = schema.field(VIEW_KEY).map(|f| &f.ty) {
            if let Some(path) = self.paths.iter().find(|p| !views.contains(&p.view)) {
                return Err(ConfigError::ValidationError {
                    message: format!(
                        "Path '{}' targets view '{}' which the schema does not allow",
                        path.pattern, path.view
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.flush_timeout_ms)
    }

    /// Builds the declared schema.
    pub fn schema(&self) -> Result<Schema, ConfigError> {
        let mut builder = Schema::builder(&self.schema.name).strict(self.schema.strict);
        for field in &self.schema.fields {
            builder = builder.field(field.to_spec()?);
        }
        builder.build()
    }

    /// Builds the declared path patterns, in order.
    pub fn path_codec(&self) -> Result<PathCodec, ConfigError> {
        let patterns = self
            .paths
            .iter()
            .map(|p| PathPattern::new(&p.view, &p.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PathCodec::from_patterns(patterns))
    }
}

impl FieldSettings {
    fn field_type(&self) -> Result<FieldType, ConfigError> {
        match self.type_str.as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "enum" => Ok(FieldType::Enum(self.values.clone())),
            other => Err(ConfigError::ValidationError {
                message: format!(
                    "Field '{}' has unknown type '{}' (expected string, number, boolean or enum)",
                    self.name, other
                ),
            }),
        }
    }

    fn to_spec(&self) -> Result<FieldSpec, ConfigError> {
        let ty = self.field_type()?;
        let spec = if self.required {
            FieldSpec::required(&self.name, ty)
        } else {
            FieldSpec::optional(&self.name, ty)
        };
        Ok(match &self.default {
            Some(default) => spec.with_default(default.clone()),
            None => spec,
        })
    }
}
