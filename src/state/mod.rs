//! Application state model.
//!
//! State is a flat map from keys to scalar [`Value`]s with one mandatory
//! key, `view`, naming the active screen. Changes are requested with a
//! [`Patch`]: either a partial map merged over the current state, or a
//! function that replaces it.

mod shallow;
mod value;

use std::collections::BTreeMap;
use std::fmt;

pub use shallow::{shallow_equal, shallow_equal_opt};
pub use value::Value;

/// Key of the mandatory field identifying the current screen.
pub const VIEW_KEY: &str = "view";

/// Flat application state.
pub type State = BTreeMap<String, Value>;

/// Function form of a patch: receives the current state, returns the next one.
pub type ReplaceFn = Box<dyn FnOnce(&State) -> State + Send>;

/// Builds a [`State`] from `key => value` pairs.
///
/// ```
/// let s = navstate::state! { "view" => "home", "page" => 2 };
/// assert_eq!(s.len(), 2);
/// ```
#[macro_export]
macro_rules! state {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut s = $crate::State::new();
        $( s.insert(::std::string::String::from($key), $crate::Value::from($value)); )*
        s
    }};
}

/// Partial state update. A `None` value deletes the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchMap(BTreeMap<String, Option<Value>>);

impl PatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), Some(value.into()));
        self
    }

    /// Delete `key` from the resulting state.
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.0.insert(key.into(), None);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<Value>) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Option<Value>> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Value>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge over `state`, removing every key patched to `None`.
    pub fn merge_into(self, state: &State) -> State {
        let mut next = state.clone();
        for (key, value) in self.0 {
            match value {
                Some(value) => {
                    next.insert(key, value);
                }
                None => {
                    next.remove(&key);
                }
            }
        }
        next
    }
}

impl From<State> for PatchMap {
    fn from(state: State) -> Self {
        Self(state.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

impl FromIterator<(String, Option<Value>)> for PatchMap {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A requested state change.
///
/// The two shapes never mix: a [`Patch::Merge`] is overlaid on the current
/// state, a [`Patch::Replace`] produces the whole next state.
pub enum Patch {
    Merge(PatchMap),
    Replace(ReplaceFn),
}

impl Patch {
    /// Wrap a replacement function.
    pub fn replace<F>(f: F) -> Self
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        Patch::Replace(Box::new(f))
    }

    /// Replace the state with a fixed value.
    pub fn replace_with(state: State) -> Self {
        Patch::Replace(Box::new(move |_| state))
    }

    pub fn is_replace(&self) -> bool {
        matches!(self, Patch::Replace(_))
    }

    /// Compute the next state from `current`.
    pub fn apply(self, current: &State) -> State {
        match self {
            Patch::Merge(map) => map.merge_into(current),
            Patch::Replace(f) => f(current),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Merge(map) => f.debug_tuple("Merge").field(map).finish(),
            Patch::Replace(_) => f.write_str("Replace(<fn>)"),
        }
    }
}

impl From<PatchMap> for Patch {
    fn from(map: PatchMap) -> Self {
        Patch::Merge(map)
    }
}

impl From<State> for Patch {
    fn from(state: State) -> Self {
        Patch::Merge(PatchMap::from(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_and_keeps_other_keys() {
        let current = state! { "view" => "a", "foo" => "x" };
        let next = Patch::from(PatchMap::new().set("bar", 4)).apply(&current);
        assert_eq!(next, state! { "view" => "a", "foo" => "x", "bar" => 4 });
    }

    #[test]
    fn merge_deletes_unset_keys() {
        let current = state! { "view" => "a", "foo" => "x" };
        let next = Patch::from(PatchMap::new().unset("foo")).apply(&current);
        assert_eq!(next, state! { "view" => "a" });
    }

    #[test]
    fn unset_of_absent_key_is_harmless() {
        let current = state! { "view" => "a" };
        let next = Patch::from(PatchMap::new().unset("nope")).apply(&current);
        assert_eq!(next, current);
    }

    #[test]
    fn replace_ignores_current_keys() {
        let current = state! { "view" => "a", "foo" => "x" };
        let next = Patch::replace(|s| {
            let mut out = State::new();
            out.insert(VIEW_KEY.to_string(), s[VIEW_KEY].clone());
            out
        })
        .apply(&current);
        assert_eq!(next, state! { "view" => "a" });
    }

    #[test]
    fn debug_hides_function() {
        let patch = Patch::replace_with(state! { "view" => "a" });
        assert!(patch.is_replace());
        assert_eq!(format!("{:?}", patch), "Replace(<fn>)");
    }
}
