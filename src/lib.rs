//! URL-synchronized application state.
//!
//! A single flat [`State`] drives the application and is mirrored into the
//! browser location: fields owned by a path pattern go in the pathname, the
//! rest in the query string. Changes go through [`StateContext::transition`];
//! browser navigations flow back in and are merged with the live state.
//!
//! ```no_run
//! use navstate::{run, state, FieldType, PatchMap, RunConfig, Schema};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::builder("AppState")
//!     .required("view", FieldType::String)
//!     .optional("page", FieldType::Number)
//!     .build()?;
//!
//! let ctx = run(RunConfig::new(schema, state! { "view" => "home" })).await?;
//! ctx.transition(PatchMap::new().set("page", 2))?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod codec;
pub mod config;
pub mod engine;
pub mod logging;
pub mod mvi;
pub mod observable;
pub mod runtime;
pub mod schema;
pub mod shutdown;
pub mod state;

pub use browser::{Action, BrowserAdapter, History, Location, MemoryHistory};
pub use codec::{PathCodec, PathPattern};
pub use config::{ConfigError, Settings};
pub use engine::{DryRun, EnginePhase, TransitionEngine, TransitionError};
pub use observable::{StateCell, SubscriptionId};
pub use runtime::{run, RunConfig, RunError, StateContext};
pub use schema::{FieldSpec, FieldType, Schema, ValidationError};
pub use state::{Patch, PatchMap, State, Value};
