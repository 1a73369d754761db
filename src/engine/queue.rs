//! FIFO of transitions requested while a browser write is in flight.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::state::Patch;

#[derive(Debug)]
pub struct QueuedTransition {
    pub id: Option<String>,
    pub patch: Patch,
    pub enqueued_at: Instant,
}

impl QueuedTransition {
    pub fn new(id: Option<String>, patch: Patch) -> Self {
        Self {
            id,
            patch,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TransitionQueue {
    items: VecDeque<QueuedTransition>,
}

impl TransitionQueue {
    pub fn push(&mut self, item: QueuedTransition) {
        self.items.push_back(item);
    }

    pub fn pop(&mut self) -> Option<QueuedTransition> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|q| q.id.as_deref() == Some(id))
    }

    /// Whether the oldest entry has waited at least `timeout` at `now`.
    pub fn head_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.items
            .front()
            .is_some_and(|head| now.saturating_duration_since(head.enqueued_at) >= timeout)
    }
}
