//! One-level structural equality over key/value maps.

use std::collections::BTreeMap;

/// Returns true if both maps are the same object, or hold exactly the same
/// keys with `==` values.
///
/// No recursion: values are compared as a whole. Key order is irrelevant.
pub fn shallow_equal<V: PartialEq>(a: &BTreeMap<String, V>, b: &BTreeMap<String, V>) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w))
}

/// Like [`shallow_equal`], where a missing map only equals another missing map.
pub fn shallow_equal_opt<V: PartialEq>(
    a: Option<&BTreeMap<String, V>>,
    b: Option<&BTreeMap<String, V>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => shallow_equal(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{State, Value};

    fn make(pairs: &[(&str, Value)]) -> State {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn same_reference_is_equal() {
        let s = make(&[("view", Value::from(f64::NAN))]);
        assert!(shallow_equal(&s, &s));
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let a = make(&[("view", "a".into()), ("bar", 4.into())]);
        let b = make(&[("bar", 4.into()), ("view", "a".into())]);
        assert!(shallow_equal(&a, &b));
    }

    #[test]
    fn different_key_sets_are_unequal() {
        let a = make(&[("view", "a".into())]);
        let b = make(&[("view", "a".into()), ("bar", 4.into())]);
        assert!(!shallow_equal(&a, &b));
        assert!(!shallow_equal(&b, &a));
    }

    #[test]
    fn different_values_are_unequal() {
        let a = make(&[("view", "a".into()), ("bar", 4.into())]);
        let b = make(&[("view", "a".into()), ("bar", "4".into())]);
        assert!(!shallow_equal(&a, &b));
    }

    #[test]
    fn nan_values_in_distinct_maps_are_unequal() {
        let a = make(&[("x", Value::from(f64::NAN))]);
        let b = make(&[("x", Value::from(f64::NAN))]);
        assert!(!shallow_equal(&a, &b));
    }

    #[test]
    fn missing_maps() {
        let a = make(&[("view", "a".into())]);
        assert!(shallow_equal_opt::<Value>(None, None));
        assert!(!shallow_equal_opt(Some(&a), None));
        assert!(!shallow_equal_opt(None, Some(&a)));
        assert!(shallow_equal_opt(Some(&a), Some(&a.clone())));
    }
}
