//! Path codec: ordered path matchers mapping pathnames to state fields.
//!
//! Matchers are tried in declaration order. A fallback matcher that maps
//! the whole pathname to `view` always matches last.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::codec::params::Params;
use crate::config::ConfigError;
use crate::state::{State, VIEW_KEY};

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn escape_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

pub fn decode_segment(escaped: &str) -> String {
    percent_decode_str(escaped).decode_utf8_lossy().into_owned()
}

/// Strip surrounding slashes from a pathname.
pub fn trim_pathname(pathname: &str) -> &str {
    pathname.trim_matches('/')
}

/// A rule mapping between a pathname and the subset of state it owns.
///
/// Implementations must be pure. Every matcher should own `view`, otherwise
/// path cleanup may strip it.
pub trait PathMatcher: Send + Sync {
    /// Extract fields from a trimmed, still-escaped pathname.
    fn recognize(&self, pathname: &str) -> Option<Params>;

    /// Write the pathname (without the leading `/`) for the fields returned
    /// by [`PathMatcher::pick`]. Output is escaped.
    fn serialize(&self, fields: &State) -> String;

    /// Whether `state` belongs to this path.
    fn accepts(&self, state: &State) -> bool;

    /// Keys this path owns.
    fn keys(&self) -> Vec<&str>;

    /// The part of `state` this path owns.
    fn pick(&self, state: &State) -> State {
        self.keys()
            .into_iter()
            .filter_map(|k| state.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Pattern such as `user/:userId` bound to one view.
///
/// Literal segments must match exactly, `:name` segments capture a field.
/// The pattern accepts a state when its `view` equals the bound view and
/// every captured field is present.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    view: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(view: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        let view = view.into();
        let invalid = |message: String| ConfigError::ValidationError { message };

        let mut seen = BTreeSet::new();
        let mut segments = Vec::new();
        for part in trim_pathname(pattern).split('/') {
            if part.is_empty() {
                return Err(invalid(format!("empty segment in path pattern '{}'", pattern)));
            }
            match part.strip_prefix(':') {
                Some(name) => {
                    if name.is_empty() || name == VIEW_KEY || !seen.insert(name.to_string()) {
                        return Err(invalid(format!(
                            "invalid parameter ':{}' in path pattern '{}'",
                            name, pattern
                        )));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self { view, segments })
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl PathMatcher for PathPattern {
    fn recognize(&self, pathname: &str) -> Option<Params> {
        let parts: Vec<&str> = pathname.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut fields = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            let decoded = decode_segment(part);
            match segment {
                Segment::Literal(literal) if *literal == decoded => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if decoded.is_empty() => return None,
                Segment::Param(name) => {
                    fields.insert(name.clone(), decoded);
                }
            }
        }
        fields.insert(VIEW_KEY.to_string(), self.view.clone());
        Some(fields)
    }

    fn serialize(&self, fields: &State) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => escape_segment(literal),
                Segment::Param(name) => fields
                    .get(name)
                    .map(|v| escape_segment(&v.to_string()))
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn accepts(&self, state: &State) -> bool {
        state.get(VIEW_KEY).and_then(|v| v.as_str()) == Some(self.view.as_str())
            && self.params().all(|name| state.contains_key(name))
    }

    fn keys(&self) -> Vec<&str> {
        std::iter::once(VIEW_KEY).chain(self.params()).collect()
    }
}

/// Maps the whole pathname to `view`. Matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPath;

impl PathMatcher for FallbackPath {
    fn recognize(&self, pathname: &str) -> Option<Params> {
        let mut fields = Params::new();
        fields.insert(VIEW_KEY.to_string(), decode_segment(pathname));
        Some(fields)
    }

    fn serialize(&self, fields: &State) -> String {
        fields
            .get(VIEW_KEY)
            .map(|v| escape_segment(&v.to_string()))
            .unwrap_or_default()
    }

    fn accepts(&self, _state: &State) -> bool {
        true
    }

    fn keys(&self) -> Vec<&str> {
        vec![VIEW_KEY]
    }
}

/// Which matcher a pathname or state resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRef {
    /// Index into the declared matcher list.
    Declared(usize),
    Fallback,
}

/// The ordered matcher list plus the fallback.
#[derive(Clone, Default)]
pub struct PathCodec {
    matchers: Vec<Arc<dyn PathMatcher>>,
    fallback: FallbackPath,
}

impl PathCodec {
    pub fn new(matchers: Vec<Arc<dyn PathMatcher>>) -> Self {
        Self {
            matchers,
            fallback: FallbackPath,
        }
    }

    /// Codec built from patterns only.
    pub fn from_patterns(patterns: Vec<PathPattern>) -> Self {
        Self::new(
            patterns
                .into_iter()
                .map(|p| Arc::new(p) as Arc<dyn PathMatcher>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matcher(&self, path: PathRef) -> &dyn PathMatcher {
        match path {
            PathRef::Declared(i) => match self.matchers.get(i) {
                Some(m) => m.as_ref(),
                None => &self.fallback,
            },
            PathRef::Fallback => &self.fallback,
        }
    }

    /// First matcher recognizing `pathname`, with the fields it extracted.
    pub fn match_path(&self, pathname: &str) -> (PathRef, Params) {
        let trimmed = trim_pathname(pathname);
        for (i, matcher) in self.matchers.iter().enumerate() {
            if let Some(fields) = matcher.recognize(trimmed) {
                return (PathRef::Declared(i), fields);
            }
        }
        let fields = self.fallback.recognize(trimmed).unwrap_or_default();
        (PathRef::Fallback, fields)
    }

    /// First matcher accepting `state`.
    pub fn select_path(&self, state: &State) -> PathRef {
        self.matchers
            .iter()
            .position(|m| m.accepts(state))
            .map(PathRef::Declared)
            .unwrap_or(PathRef::Fallback)
    }

    /// Pathname for `state`, with a leading `/`.
    pub fn serialize_path(&self, state: &State) -> String {
        let matcher = self.matcher(self.select_path(state));
        format!("/{}", matcher.serialize(&matcher.pick(state)))
    }

    /// Keys of `state` owned by the path `state` selects.
    pub fn owned_keys(&self, state: &State) -> Vec<String> {
        self.matcher(self.select_path(state))
            .pick(state)
            .into_keys()
            .collect()
    }

    /// Strip keys owned by `from` but not by the path `state` now selects.
    ///
    /// A no-op when the selected path did not change.
    pub fn cleanup(&self, from: PathRef, mut state: State) -> State {
        let to = self.select_path(&state);
        if from == to {
            return state;
        }
        let keep = self.matcher(to).pick(&state);
        let stale: Vec<String> = self
            .matcher(from)
            .pick(&state)
            .into_keys()
            .filter(|k| !keep.contains_key(k))
            .collect();
        if !stale.is_empty() {
            tracing::debug!(?from, ?to, ?stale, "Stripping keys owned by previous path");
        }
        for key in stale {
            state.remove(&key);
        }
        state
    }
}

impl fmt::Debug for PathCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathCodec")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;

    fn codec() -> PathCodec {
        PathCodec::from_patterns(vec![
            PathPattern::new("user", "user/:userId").unwrap(),
            PathPattern::new("post", "user/:userId/post/:postId").unwrap(),
        ])
    }

    #[test]
    fn match_path_uses_declaration_order() {
        let (path, fields) = codec().match_path("/user/42/");
        assert_eq!(path, PathRef::Declared(0));
        assert_eq!(fields.get("userId").map(String::as_str), Some("42"));
        assert_eq!(fields.get("view").map(String::as_str), Some("user"));

        let (path, fields) = codec().match_path("/user/42/post/7");
        assert_eq!(path, PathRef::Declared(1));
        assert_eq!(fields.get("postId").map(String::as_str), Some("7"));
    }

    #[test]
    fn unmatched_pathname_falls_back_to_view() {
        let (path, fields) = codec().match_path("/settings%20page/");
        assert_eq!(path, PathRef::Fallback);
        assert_eq!(fields.get("view").map(String::as_str), Some("settings page"));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn empty_pathname_maps_to_empty_view() {
        let (path, fields) = PathCodec::default().match_path("/");
        assert_eq!(path, PathRef::Fallback);
        assert_eq!(fields.get("view").map(String::as_str), Some(""));
    }

    #[test]
    fn only_slashes_are_trimmed() {
        let (_, fields) = PathCodec::default().match_path("/ home /");
        assert_eq!(fields.get("view").map(String::as_str), Some(" home "));
    }

    #[test]
    fn select_path_requires_all_params() {
        let c = codec();
        assert_eq!(
            c.select_path(&state! { "view" => "user", "userId" => 1 }),
            PathRef::Declared(0)
        );
        assert_eq!(c.select_path(&state! { "view" => "user" }), PathRef::Fallback);
        assert_eq!(c.select_path(&state! { "view" => "home" }), PathRef::Fallback);
    }

    #[test]
    fn serialize_path_escapes_values() {
        let c = codec();
        assert_eq!(
            c.serialize_path(&state! { "view" => "user", "userId" => "a/b c", "q" => 1 }),
            "/user/a%2Fb%20c"
        );
        assert_eq!(c.serialize_path(&state! { "view" => "home" }), "/home");
        assert_eq!(c.serialize_path(&state! { "view" => "" }), "/");
    }

    #[test]
    fn serialized_path_is_recognized_again() {
        let c = codec();
        let s = state! { "view" => "user", "userId" => "a/b c" };
        let (path, fields) = c.match_path(&c.serialize_path(&s));
        assert_eq!(path, PathRef::Declared(0));
        assert_eq!(fields.get("userId").map(String::as_str), Some("a/b c"));
    }

    #[test]
    fn cleanup_strips_keys_of_previous_path() {
        let c = codec();
        let from = c.select_path(&state! { "view" => "user", "userId" => 3 });
        let cleaned = c.cleanup(from, state! { "view" => "home", "userId" => 3, "q" => "x" });
        assert_eq!(cleaned, state! { "view" => "home", "q" => "x" });
    }

    #[test]
    fn cleanup_keeps_keys_shared_with_next_path() {
        let c = codec();
        let from = c.select_path(&state! { "view" => "user", "userId" => 3 });
        let next = state! { "view" => "post", "userId" => 3, "postId" => 9 };
        assert_eq!(c.cleanup(from, next.clone()), next);
    }

    #[test]
    fn cleanup_is_noop_on_same_path() {
        let c = codec();
        let s = state! { "view" => "user", "userId" => 4 };
        assert_eq!(c.cleanup(PathRef::Declared(0), s.clone()), s);
    }

    #[test]
    fn owned_keys_follow_selected_path() {
        let c = codec();
        assert_eq!(
            c.owned_keys(&state! { "view" => "user", "userId" => 4, "q" => 1 }),
            vec!["userId".to_string(), "view".to_string()]
        );
    }

    #[test]
    fn pattern_rejects_bad_declarations() {
        assert!(PathPattern::new("v", "a//b").is_err());
        assert!(PathPattern::new("v", "a/:").is_err());
        assert!(PathPattern::new("v", "a/:view").is_err());
        assert!(PathPattern::new("v", "a/:x/:x").is_err());
    }
}
