//! Observable holder of the committed state.
//!
//! [`StateCell`] always has a value. New subscribers are called with it right
//! away, then with every published state in publication order. A publish made
//! from inside a subscriber is queued and delivered after the current round.
//!
//! Publishes carry the revision they were committed under. One that arrives
//! after a newer revision is dropped, so concurrent publishers cannot leave
//! the cell on a stale state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::state::State;

/// Callback invoked with each published state.
pub type Listener = Arc<dyn Fn(&State) + Send + Sync>;

/// Handle returned by [`StateCell::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Default)]
struct Delivery {
    queue: VecDeque<State>,
    active: bool,
}

struct Current {
    state: State,
    revision: u64,
}

struct Shared {
    current: Mutex<Current>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    delivery: Mutex<Delivery>,
    next_id: AtomicU64,
}

/// Shared, cloneable state holder.
#[derive(Clone)]
pub struct StateCell {
    shared: Arc<Shared>,
}

impl StateCell {
    pub fn new(initial: State) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: Mutex::new(Current {
                    state: initial,
                    revision: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                delivery: Mutex::new(Delivery::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Snapshot of the latest published state.
    pub fn get(&self) -> State {
        self.shared.current.lock().state.clone()
    }

    /// Store `state` and notify every subscriber, unless a revision at least
    /// as new was already published.
    pub(crate) fn publish(&self, state: State, revision: u64) {
        {
            let mut current = self.shared.current.lock();
            if revision <= current.revision {
                trace!(revision, latest = current.revision, "Dropping stale publish");
                return;
            }
            current.revision = revision;
            current.state = state.clone();

            // Queued under `current` so delivery follows revision order.
            let mut delivery = self.shared.delivery.lock();
            delivery.queue.push_back(state);
            if delivery.active {
                return;
            }
            delivery.active = true;
        }

        loop {
            let next = {
                let mut delivery = self.shared.delivery.lock();
                match delivery.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        delivery.active = false;
                        return;
                    }
                }
            };
            // Snapshot so listeners may subscribe or unsubscribe while running.
            let listeners: Vec<Listener> = self
                .shared
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&next);
            }
        }
    }

    /// Register `listener` and call it immediately with the current state.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    pub fn subscribe_arc(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .push((id, Arc::clone(&listener)));
        let current = self.get();
        listener(&current);
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }
}

impl std::fmt::Debug for StateCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("current", &self.shared.current.lock().state)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;

    fn recorder(cell: &StateCell) -> Arc<Mutex<Vec<State>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.subscribe(move |s| sink.lock().push(s.clone()));
        seen
    }

    #[test]
    fn subscribe_fires_with_current_value() {
        let cell = StateCell::new(state! { "view" => "home" });
        let seen = recorder(&cell);
        assert_eq!(*seen.lock(), vec![state! { "view" => "home" }]);
    }

    #[test]
    fn publish_notifies_in_order() {
        let cell = StateCell::new(state! { "view" => "a" });
        let seen = recorder(&cell);
        cell.publish(state! { "view" => "b" }, 1);
        cell.publish(state! { "view" => "c" }, 2);

        let views: Vec<_> = seen
            .lock()
            .iter()
            .map(|s| s["view"].to_string())
            .collect();
        assert_eq!(views, vec!["a", "b", "c"]);
        assert_eq!(cell.get(), state! { "view" => "c" });
    }

    #[test]
    fn reentrant_publish_is_delivered_after_current_round() {
        let cell = StateCell::new(state! { "view" => "a" });
        let inner = cell.clone();
        cell.subscribe(move |s| {
            if s["view"].as_str() == Some("b") {
                inner.publish(state! { "view" => "c" }, 2);
            }
        });
        let seen = recorder(&cell);

        cell.publish(state! { "view" => "b" }, 1);

        let views: Vec<_> = seen
            .lock()
            .iter()
            .map(|s| s["view"].to_string())
            .collect();
        assert_eq!(views, vec!["a", "b", "c"]);
    }

    #[test]
    fn stale_revision_is_dropped() {
        let cell = StateCell::new(state! { "view" => "a" });
        let seen = recorder(&cell);

        cell.publish(state! { "view" => "c" }, 2);
        cell.publish(state! { "view" => "b" }, 1);
        cell.publish(state! { "view" => "x" }, 2);

        let views: Vec<_> = seen
            .lock()
            .iter()
            .map(|s| s["view"].to_string())
            .collect();
        assert_eq!(views, vec!["a", "c"]);
        assert_eq!(cell.get(), state! { "view" => "c" });
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let cell = StateCell::new(state! { "view" => "a" });
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = cell.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(cell.unsubscribe(id));
        assert!(!cell.unsubscribe(id));
        cell.publish(state! { "view" => "b" }, 1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cell.listener_count(), 0);
    }
}
