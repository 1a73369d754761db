//! File-based settings.
//!
//! A TOML file declares the schema, the path patterns and engine tuning.
//! Closures (reducer, subscriber, key filter, push policy) are supplied in
//! code through [`RunConfig`](crate::runtime::RunConfig).

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{EngineSettings, FieldSettings, PathSettings, SchemaSettings, Settings};
