//! Navigation history abstraction and an in-memory implementation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Always starts with `/`.
    pub pathname: String,
    /// Empty, or starts with `?`.
    pub search: String,
    /// Unique per entry.
    pub key: String,
}

impl Location {
    /// Split `url` into pathname and search. Fragments are discarded.
    pub fn parse(url: &str) -> Self {
        let url = url.split('#').next().unwrap_or_default();
        let (pathname, search) = match url.find('?') {
            Some(i) => url.split_at(i),
            None => (url, ""),
        };

        let pathname = if pathname.starts_with('/') {
            pathname.to_string()
        } else {
            format!("/{}", pathname)
        };
        let search = if search == "?" { "" } else { search };

        Self {
            pathname,
            search: search.to_string(),
            key: Uuid::new_v4().to_string(),
        }
    }

    pub fn href(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }

    /// Equal pathname and search, ignoring the entry key.
    pub fn same_url(&self, other: &Location) -> bool {
        self.pathname == other.pathname && self.search == other.search
    }
}

/// How the current entry was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Push,
    Replace,
    Pop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Push => "PUSH",
            Action::Replace => "REPLACE",
            Action::Pop => "POP",
        })
    }
}

pub type HistoryListener = Arc<dyn Fn(&Location, Action) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A navigation history the engine can read, write and observe.
///
/// Listeners are called synchronously after each navigation, outside any
/// internal lock.
pub trait History: Send + Sync {
    fn location(&self) -> Location;

    /// Action that produced the current entry.
    fn action(&self) -> Action;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, url: &str);

    fn replace(&self, url: &str);

    /// Move `delta` entries back (negative) or forward (positive).
    fn go(&self, delta: isize);

    fn back(&self) {
        self.go(-1);
    }

    fn forward(&self) {
        self.go(1);
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId;

    fn unlisten(&self, id: ListenerId) -> bool;
}

struct Entries {
    stack: Vec<Location>,
    index: usize,
    action: Action,
}

/// History kept in memory, for tests and non-browser hosts.
pub struct MemoryHistory {
    entries: Mutex<Entries>,
    listeners: Mutex<Vec<(ListenerId, HistoryListener)>>,
    next_id: AtomicU64,
}

impl MemoryHistory {
    /// A history holding only `/`.
    pub fn new() -> Self {
        Self::with_entries(&["/"])
    }

    /// A history holding `urls`, positioned on the last one.
    pub fn with_entries(urls: &[&str]) -> Self {
        let mut stack: Vec<Location> = urls.iter().map(|u| Location::parse(u)).collect();
        if stack.is_empty() {
            stack.push(Location::parse("/"));
        }
        let index = stack.len() - 1;
        Self {
            entries: Mutex::new(Entries {
                stack,
                index,
                action: Action::Pop,
            }),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn index(&self) -> usize {
        self.entries.lock().index
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<Location> {
        self.entries.lock().stack.clone()
    }

    fn notify(&self, location: &Location, action: Action) {
        let listeners: Vec<HistoryListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(location, action);
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let entries = self.entries.lock();
        entries.stack[entries.index].clone()
    }

    fn action(&self) -> Action {
        self.entries.lock().action
    }

    fn len(&self) -> usize {
        self.entries.lock().stack.len()
    }

    fn push(&self, url: &str) {
        let location = Location::parse(url);
        {
            let mut entries = self.entries.lock();
            let next = entries.index + 1;
            entries.stack.truncate(next);
            entries.stack.push(location.clone());
            entries.index = next;
            entries.action = Action::Push;
        }
        self.notify(&location, Action::Push);
    }

    fn replace(&self, url: &str) {
        let location = Location::parse(url);
        {
            let mut entries = self.entries.lock();
            let index = entries.index;
            entries.stack[index] = location.clone();
            entries.action = Action::Replace;
        }
        self.notify(&location, Action::Replace);
    }

    /// Clamped to the stack bounds. Staying in place notifies nobody.
    fn go(&self, delta: isize) {
        let location = {
            let mut entries = self.entries.lock();
            let last = entries.stack.len() as isize - 1;
            let target = (entries.index as isize + delta).clamp(0, last) as usize;
            if target == entries.index {
                return;
            }
            entries.index = target;
            entries.action = Action::Pop;
            entries.stack[target].clone()
        };
        self.notify(&location, Action::Pop);
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("MemoryHistory")
            .field("index", &entries.index)
            .field("len", &entries.stack.len())
            .field("action", &entries.action)
            .finish()
    }
}
