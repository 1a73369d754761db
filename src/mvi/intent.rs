//! Base trait for intents.

/// Marker trait for intent objects.
///
/// Intents are events a model reacts to: a browser confirmation, a timeout,
/// a write handed to the browser.
pub trait Intent: Send + 'static {}
