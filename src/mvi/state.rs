//! Base trait for reducer-driven models.

/// Marker trait for models folded by a [`Reducer`](super::Reducer).
///
/// Models are cloned to take snapshots and compared to detect changes.
/// `Default` is the resting state, used while a field is being reduced.
pub trait Model: Clone + PartialEq + Default + Send + 'static {}
