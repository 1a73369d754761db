//! Glue between structured state and a [`History`].

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::browser::history::{Action, History, ListenerId, Location};
use crate::codec::{params, query, PathCodec};
use crate::engine::BrowserSync;
use crate::schema::Schema;
use crate::state::{State, VIEW_KEY};

/// Decides whether a state key is written to the URL.
pub type KeyFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Given `(old, new)`, decides between a new entry (`true`) and replacing
/// the current one (`false`).
pub type PushPolicy = Arc<dyn Fn(&State, &State) -> bool + Send + Sync>;

/// A browser navigation, parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserChange {
    /// Fields read from the URL. Not yet checked against the schema.
    pub state: State,
    pub action: Action,
    pub location: Location,
}

pub struct BrowserAdapter {
    history: Arc<dyn History>,
    paths: PathCodec,
    schema: Arc<Schema>,
    key_filter: KeyFilter,
    push_policy: PushPolicy,
}

impl BrowserAdapter {
    /// Serializes every key and pushes every write.
    pub fn new(history: Arc<dyn History>, paths: PathCodec, schema: Arc<Schema>) -> Self {
        Self {
            history,
            paths,
            schema,
            key_filter: Arc::new(|_| true),
            push_policy: Arc::new(|_, _| true),
        }
    }

    pub fn with_key_filter(mut self, filter: KeyFilter) -> Self {
        self.key_filter = filter;
        self
    }

    pub fn with_push_policy(mut self, policy: PushPolicy) -> Self {
        self.push_policy = policy;
        self
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.history
    }

    pub fn should_serialize_key(&self, key: &str) -> bool {
        (self.key_filter)(key)
    }

    /// The part of `state` written to the URL.
    pub fn serializable(&self, state: &State) -> State {
        state
            .iter()
            .filter(|(k, _)| self.should_serialize_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// URL for `state`: path fields in the pathname, the rest in the query.
    pub fn url_for(&self, state: &State) -> String {
        let pathname = self.paths.serialize_path(state);
        let mut rest = state.clone();
        for key in self.paths.owned_keys(state) {
            rest.remove(&key);
        }
        let search = query::encode(&params::stringify(&rest));
        if search.is_empty() {
            pathname
        } else {
            format!("{}?{}", pathname, search)
        }
    }

    /// Write `state` to history. Returns `false` when the URL would not change.
    pub fn sync_to_browser(&self, state: &State, push: bool) -> bool {
        let url = self.url_for(state);
        let target = Location::parse(&url);
        if self.history.location().same_url(&target) {
            debug!(url = %url, "Browser already shows state, skipping write");
            return false;
        }

        debug!(url = %url, push, "Syncing state to browser");
        if push {
            self.history.push(&url);
        } else {
            self.history.replace(&url);
        }
        true
    }

    /// Fields encoded in `location`. Path fields win over query fields.
    ///
    /// An empty pathname carries no view.
    pub fn parse_location(&self, location: &Location) -> State {
        let (_, path_fields) = self.paths.match_path(&location.pathname);
        let mut raw = query::decode(&location.search);
        raw.extend(path_fields);
        if raw.get(VIEW_KEY).is_some_and(|v| v.is_empty()) {
            raw.remove(VIEW_KEY);
        }
        params::parse(&self.schema, &raw)
    }

    pub fn current_state(&self) -> State {
        self.parse_location(&self.history.location())
    }

    /// Call `callback` now with the current location, then on every navigation.
    pub fn on_browser_change<F>(self: &Arc<Self>, callback: F) -> ListenerId
    where
        F: Fn(BrowserChange) + Send + Sync + 'static,
    {
        let location = self.history.location();
        callback(BrowserChange {
            state: self.parse_location(&location),
            action: self.history.action(),
            location,
        });

        let adapter = Arc::downgrade(self);
        self.history.listen(Arc::new(move |location, action| {
            let Some(adapter) = adapter.upgrade() else {
                return;
            };
            callback(BrowserChange {
                state: adapter.parse_location(location),
                action,
                location: location.clone(),
            });
        }))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.history.unlisten(id)
    }
}

impl BrowserSync for BrowserAdapter {
    fn sync(&self, old: &State, new: &State) -> bool {
        let serialized = self.serializable(new);
        if serialized.len() != new.len() {
            let omitted: Vec<&String> = new
                .keys()
                .filter(|k| !serialized.contains_key(*k))
                .collect();
            debug!(?omitted, "Keys kept out of the URL");
        }
        self.sync_to_browser(&serialized, (self.push_policy)(old, new))
    }
}

impl fmt::Debug for BrowserAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserAdapter")
            .field("location", &self.history.location().href())
            .field("paths", &self.paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MemoryHistory;
    use crate::codec::PathPattern;
    use crate::schema::FieldType;
    use crate::state;
    use parking_lot::Mutex;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("AppState")
                .required("view", FieldType::String)
                .optional("userId", FieldType::Number)
                .optional("bar", FieldType::Number)
                .optional("secret", FieldType::String)
                .build()
                .unwrap(),
        )
    }

    fn adapter(history: Arc<MemoryHistory>) -> Arc<BrowserAdapter> {
        let paths =
            PathCodec::from_patterns(vec![PathPattern::new("user", "user/:userId").unwrap()]);
        Arc::new(
            BrowserAdapter::new(history, paths, schema())
                .with_key_filter(Arc::new(|k| k != "secret")),
        )
    }

    #[test]
    fn url_puts_path_fields_in_pathname() {
        let a = adapter(Arc::new(MemoryHistory::new()));
        assert_eq!(
            a.url_for(&state! { "view" => "user", "userId" => 7, "bar" => 4 }),
            "/user/7?bar=4"
        );
        assert_eq!(a.url_for(&state! { "view" => "home" }), "/home");
    }

    #[test]
    fn sync_skips_unchanged_url() {
        let history = Arc::new(MemoryHistory::with_entries(&["/home"]));
        let a = adapter(Arc::clone(&history));

        assert!(!a.sync_to_browser(&state! { "view" => "home" }, true));
        assert!(a.sync_to_browser(&state! { "view" => "home", "bar" => 1 }, false));
        assert_eq!(history.len(), 1);
        assert_eq!(history.location().href(), "/home?bar=1");
    }

    #[test]
    fn sync_omits_filtered_keys() {
        let history = Arc::new(MemoryHistory::new());
        let a = adapter(Arc::clone(&history));
        let old = state! { "view" => "" };
        let new = state! { "view" => "home", "secret" => "s3" };

        assert!(a.sync(&old, &new));
        assert_eq!(history.location().href(), "/home");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn parse_location_reads_path_and_query() {
        let a = adapter(Arc::new(MemoryHistory::new()));
        let parsed = a.parse_location(&Location::parse("/user/7?bar=4&view=zzz"));
        assert_eq!(parsed, state! { "view" => "user", "userId" => 7, "bar" => 4 });

        let root = a.parse_location(&Location::parse("/?bar=1"));
        assert_eq!(root, state! { "bar" => 1 });
    }

    #[test]
    fn on_browser_change_fires_immediately_then_on_navigation() {
        let history = Arc::new(MemoryHistory::with_entries(&["/home"]));
        let a = adapter(Arc::clone(&history));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = a.on_browser_change(move |change| sink.lock().push(change));

        history.push("/user/3");
        assert!(a.remove_listener(id));
        history.push("/home");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].action, Action::Pop);
        assert_eq!(seen[0].state, state! { "view" => "home" });
        assert_eq!(seen[1].action, Action::Push);
        assert_eq!(seen[1].state, state! { "view" => "user", "userId" => 3 });
    }
}
