//! Transition engine: the state machine between requested patches, the
//! browser and subscribers.
//!
//! While idle, a request is computed, validated and either published right
//! away or handed to the browser. A browser write puts the engine in
//! [`EnginePhase::AwaitingConfirmation`]; further requests are queued until
//! the browser reports the navigation back ([`TransitionEngine::confirm`]) or
//! the flush timeout gives up on it.
//!
//! Patch functions and the transition reducer run while the engine is
//! locked. They must be pure and must not call back into the engine. Browser
//! writes and subscriber notifications happen after the lock is released.
//! Every commit of the live state carries a revision, and the state cell
//! drops publishes older than the last one it delivered.

mod phase;
mod queue;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::codec::{PathCodec, PathRef};
use crate::dispatch;
use crate::observable::StateCell;
use crate::schema::{Schema, ValidationError};
use crate::state::{shallow_equal, Patch, State};

pub use phase::{EnginePhase, PhaseIntent, PhaseReducer};
pub use queue::{QueuedTransition, TransitionQueue};

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(200);

/// Post-processing applied to every computed state (forced redirects and the like).
pub type TransitionReducer = Arc<dyn Fn(State) -> State + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("transition rejected: {0}")]
    Validation(#[from] ValidationError),
}

/// Where committed states are written.
pub trait BrowserSync: Send + Sync {
    /// Write `new` to the browser. Called with the engine unlocked, so the
    /// write may notify code that reads the engine.
    ///
    /// Returns `true` when a write happened and a confirmation will follow,
    /// `false` when nothing needed writing.
    fn sync(&self, old: &State, new: &State) -> bool;
}

/// Result of [`TransitionEngine::dry_run`].
#[derive(Debug, Clone, PartialEq)]
pub struct DryRun {
    pub state: State,
    pub changed: bool,
}

enum Outcome {
    Skipped,
    Queued,
    Unchanged,
    /// The phase already holds `next` as pending; the write is still to do.
    Write { old: State, next: State },
    AwaitingBrowser,
    Publish(State, u64),
}

struct EngineInner {
    live: State,
    revision: u64,
    phase: EnginePhase,
    queue: TransitionQueue,
    last_id: Option<String>,
    flush_timer: Option<JoinHandle<()>>,
}

impl EngineInner {
    /// Make `state` live. Returns the revision to publish it under.
    fn commit(&mut self, state: State) -> u64 {
        self.live = state;
        self.revision += 1;
        self.revision
    }
}

pub struct TransitionEngine {
    cell: StateCell,
    schema: Arc<Schema>,
    paths: PathCodec,
    browser: Arc<dyn BrowserSync>,
    reducer: Option<TransitionReducer>,
    flush_timeout: Duration,
    runtime: Option<Handle>,
    inner: Mutex<EngineInner>,
    weak_self: Weak<TransitionEngine>,
}

pub struct EngineBuilder {
    cell: StateCell,
    schema: Arc<Schema>,
    browser: Arc<dyn BrowserSync>,
    paths: PathCodec,
    reducer: Option<TransitionReducer>,
    flush_timeout: Duration,
}

impl EngineBuilder {
    pub fn paths(mut self, paths: PathCodec) -> Self {
        self.paths = paths;
        self
    }

    pub fn reducer(mut self, reducer: TransitionReducer) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// The flush timer runs on the tokio runtime current at this call.
    /// Outside a runtime queued transitions only advance on confirmation.
    pub fn build(self) -> Arc<TransitionEngine> {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            debug!("No tokio runtime, flush timeout disabled");
        }
        let live = self.cell.get();
        Arc::new_cyclic(|weak_self| TransitionEngine {
            cell: self.cell,
            schema: self.schema,
            paths: self.paths,
            browser: self.browser,
            reducer: self.reducer,
            flush_timeout: self.flush_timeout,
            runtime,
            inner: Mutex::new(EngineInner {
                live,
                revision: 0,
                phase: EnginePhase::Idle,
                queue: TransitionQueue::default(),
                last_id: None,
                flush_timer: None,
            }),
            weak_self: weak_self.clone(),
        })
    }
}

impl TransitionEngine {
    /// `cell` holds the initial state, which must already be valid.
    pub fn builder(
        cell: StateCell,
        schema: Arc<Schema>,
        browser: Arc<dyn BrowserSync>,
    ) -> EngineBuilder {
        EngineBuilder {
            cell,
            schema,
            browser,
            paths: PathCodec::default(),
            reducer: None,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Request a state change.
    ///
    /// Fails only on validation, in which case nothing changed.
    pub fn transition(&self, patch: impl Into<Patch>) -> Result<(), TransitionError> {
        let outcome = self.request(None, patch.into())?;
        self.settle(self.write(outcome));
        Ok(())
    }

    /// Like [`transition`](Self::transition), but dropped when `id` was the
    /// last applied id or is already queued.
    pub fn transition_with_id(
        &self,
        id: impl Into<String>,
        patch: impl Into<Patch>,
    ) -> Result<(), TransitionError> {
        let outcome = self.request(Some(id.into()), patch.into())?;
        self.settle(self.write(outcome));
        Ok(())
    }

    /// Compute the state `patch` would produce from the live state, without
    /// committing anything.
    pub fn dry_run(&self, patch: impl Into<Patch>) -> Result<DryRun, TransitionError> {
        let inner = self.inner.lock();
        let state = self.compute(&inner.live, patch.into())?;
        let changed = !shallow_equal(&inner.live, &state);
        Ok(DryRun { state, changed })
    }

    /// The browser reported the pending write. Publishes it and resumes the
    /// queue. Returns `false` when nothing was pending.
    pub fn confirm(&self) -> bool {
        let (confirmed, revision) = {
            let mut inner = self.inner.lock();
            let Some(pending) = inner.phase.pending().cloned() else {
                return false;
            };
            dispatch!(inner, phase, PhaseReducer, PhaseIntent::Confirmed);
            let revision = inner.commit(pending.clone());
            (pending, revision)
        };
        debug!(queued = self.queue_len(), "Browser confirmed pending state");
        self.cell.publish(confirmed, revision);
        self.drain_queue();
        true
    }

    /// Give up on the pending write without publishing it.
    pub fn abandon_pending(&self) -> Option<State> {
        let mut inner = self.inner.lock();
        let pending = inner.phase.pending().cloned()?;
        dispatch!(inner, phase, PhaseReducer, PhaseIntent::Abandoned);
        debug!("Abandoned pending browser write");
        Some(pending)
    }

    /// Publish a state the browser already shows, bypassing the browser write.
    ///
    /// The state must have come out of [`dry_run`](Self::dry_run). Clears the
    /// last applied id, so a navigation never blocks a later request with it.
    pub fn publish_external(&self, state: State) {
        let revision = {
            let mut inner = self.inner.lock();
            inner.last_id = None;
            inner.commit(state.clone())
        };
        self.cell.publish(state, revision);
        self.drain_queue();
    }

    /// Run queued transitions until one waits on the browser or the queue
    /// is empty. Does nothing while a write is pending.
    pub fn drain_queue(&self) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                if inner.phase.is_pending() {
                    return;
                }
                let next = inner.queue.pop();
                if inner.queue.is_empty() {
                    if let Some(timer) = inner.flush_timer.take() {
                        timer.abort();
                    }
                }
                next
            };
            let Some(next) = next else {
                return;
            };

            debug!(id = ?next.id, "Running queued transition");
            match self.request(next.id, next.patch).map(|o| self.write(o)) {
                Ok(Outcome::Publish(state, revision)) => self.cell.publish(state, revision),
                Ok(Outcome::AwaitingBrowser) | Ok(Outcome::Queued) => return,
                Ok(Outcome::Skipped) | Ok(Outcome::Unchanged) | Ok(Outcome::Write { .. }) => {}
                Err(err) => warn!(%err, "Dropping queued transition"),
            }
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().live.clone()
    }

    pub fn cell(&self) -> &StateCell {
        &self.cell
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn paths(&self) -> &PathCodec {
        &self.paths
    }

    pub fn phase(&self) -> EnginePhase {
        self.inner.lock().phase.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().phase.is_pending()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn last_id(&self) -> Option<String> {
        self.inner.lock().last_id.clone()
    }

    /// Path the live state selects.
    pub fn current_path(&self) -> PathRef {
        self.paths.select_path(&self.inner.lock().live)
    }

    fn request(&self, id: Option<String>, patch: Patch) -> Result<Outcome, TransitionError> {
        let mut inner = self.inner.lock();

        if let Some(id) = &id {
            if inner.last_id.as_deref() == Some(id.as_str()) || inner.queue.contains_id(id) {
                debug!(id = %id, "Skipping duplicate transition");
                return Ok(Outcome::Skipped);
            }
        }

        if inner.phase.is_pending() {
            inner.queue.push(QueuedTransition::new(id, patch));
            debug!(queued = inner.queue.len(), "Awaiting browser, transition queued");
            self.schedule_flush(&mut inner);
            return Ok(Outcome::Queued);
        }

        let next = self.compute(&inner.live, patch)?;
        inner.last_id = id;

        if shallow_equal(&inner.live, &next) {
            debug!("Transition left state unchanged");
            return Ok(Outcome::Unchanged);
        }

        // Pending before the write, so a navigation reported back from
        // inside the write is taken as its confirmation.
        let old = inner.live.clone();
        dispatch!(
            inner,
            phase,
            PhaseReducer,
            PhaseIntent::BrowserWritten {
                pending: next.clone()
            }
        );
        Ok(Outcome::Write { old, next })
    }

    /// Perform the browser write of an [`Outcome::Write`], unlocked.
    fn write(&self, outcome: Outcome) -> Outcome {
        let Outcome::Write { old, next } = outcome else {
            return outcome;
        };
        if self.browser.sync(&old, &next) {
            debug!("Browser write pending confirmation");
            return Outcome::AwaitingBrowser;
        }

        let mut inner = self.inner.lock();
        if inner.phase.pending() != Some(&next) {
            debug!("Pending state settled during the browser write");
            return Outcome::Skipped;
        }
        debug!("No browser write needed, publishing");
        dispatch!(inner, phase, PhaseReducer, PhaseIntent::Abandoned);
        let revision = inner.commit(next.clone());
        Outcome::Publish(next, revision)
    }

    fn settle(&self, outcome: Outcome) {
        match outcome {
            Outcome::Publish(state, revision) => {
                self.cell.publish(state, revision);
                self.drain_queue();
            }
            Outcome::Unchanged => self.drain_queue(),
            Outcome::Skipped
            | Outcome::Queued
            | Outcome::Write { .. }
            | Outcome::AwaitingBrowser => {}
        }
    }

    /// merge or replace, path cleanup, reducer, validate.
    fn compute(&self, current: &State, patch: Patch) -> Result<State, TransitionError> {
        let from = self.paths.select_path(current);
        let next = patch.apply(current);
        let next = self.paths.cleanup(from, next);
        let next = match &self.reducer {
            Some(reducer) => reducer(next),
            None => next,
        };
        self.schema.validate(&next)?;
        Ok(next)
    }

    fn schedule_flush(&self, inner: &mut EngineInner) {
        if let Some(timer) = inner.flush_timer.take() {
            timer.abort();
        }
        let Some(runtime) = &self.runtime else {
            return;
        };
        let engine = self.weak_self.clone();
        let timeout = self.flush_timeout;
        inner.flush_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(engine) = engine.upgrade() {
                engine.flush_expired();
            }
        }));
    }

    fn flush_expired(&self) {
        {
            let mut inner = self.inner.lock();
            inner.flush_timer = None;
            if !inner.queue.head_expired(Instant::now(), self.flush_timeout) {
                if !inner.queue.is_empty() {
                    self.schedule_flush(&mut inner);
                }
                return;
            }
            warn!(
                queued = inner.queue.len(),
                timeout_ms = self.flush_timeout.as_millis() as u64,
                "Browser confirmation did not arrive in time, forcing queued transition"
            );
            dispatch!(inner, phase, PhaseReducer, PhaseIntent::Abandoned);
            inner.last_id = None;
        }

        self.drain_queue();

        let mut inner = self.inner.lock();
        if !inner.queue.is_empty() {
            self.schedule_flush(&mut inner);
        }
    }
}

impl Drop for TransitionEngine {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().flush_timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TransitionEngine")
            .field("live", &inner.live)
            .field("revision", &inner.revision)
            .field("phase", &inner.phase)
            .field("queued", &inner.queue.len())
            .field("last_id", &inner.last_id)
            .finish()
    }
}
