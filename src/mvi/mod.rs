//! Model-Intent-Reducer primitives.
//!
//! Small state machines in this crate (the transition engine's phase, for
//! one) are written as a model plus the intents it reacts to, folded by a
//! pure reducer.
//!
//! ```text
//! Intent ──→ Reducer ──→ Model
//!    ↑                     │
//!    └─────────────────────┘
//! ```

mod intent;
mod reducer;
mod state;

pub use intent::Intent;
pub use reducer::Reducer;
pub use state::Model;

/// Fold an intent into a model field in place.
///
/// `dispatch!(inner, phase, PhaseReducer, PhaseIntent::Confirmed)` expands to
/// `inner.phase = PhaseReducer::reduce(take(&mut inner.phase), intent)`.
#[macro_export]
#[doc(hidden)]
macro_rules! dispatch {
    ($owner:expr, $field:ident, $reducer:ty, $intent:expr) => {
        $owner.$field = <$reducer as $crate::mvi::Reducer>::reduce(
            ::std::mem::take(&mut $owner.$field),
            $intent,
        );
    };
}
