//! Reducer trait.

use super::intent::Intent;
use super::state::Model;

/// Transforms a model based on intents.
///
/// The reducer is the only place where the model changes. It must be a pure
/// function: (Model, Intent) -> Model
pub trait Reducer {
    type Model: Model;

    type Intent: Intent;

    fn reduce(model: Self::Model, intent: Self::Intent) -> Self::Model;
}
