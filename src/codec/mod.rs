//! Conversions between structured state and URL pieces.
//!
//! - `params` - typed values to and from string parameters
//! - `path` - ordered path matchers over the pathname
//! - `query` - `key=value` query-string encoding

pub mod params;
pub mod path;
pub mod query;

pub use params::Params;
pub use path::{FallbackPath, PathCodec, PathMatcher, PathPattern, PathRef};
