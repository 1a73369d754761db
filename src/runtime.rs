//! Startup and the browser-event loop.
//!
//! [`run`] validates the initial state, wires the state cell, browser adapter
//! and transition engine together, and spawns a driver task that consumes
//! browser navigations. It resolves once the first browser state has been
//! merged in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::browser::{
    Action, BrowserAdapter, BrowserChange, History, KeyFilter, ListenerId, MemoryHistory,
    PushPolicy,
};
use crate::codec::PathCodec;
use crate::config::{ConfigError, Settings};
use crate::engine::{
    DryRun, TransitionEngine, TransitionError, TransitionReducer, DEFAULT_FLUSH_TIMEOUT,
};
use crate::observable::{Listener, StateCell, SubscriptionId};
use crate::schema::{Schema, ValidationError};
use crate::shutdown::ShutdownHandle;
use crate::state::{shallow_equal, Patch, State};

pub type InitFn = Box<dyn FnOnce(&StateContext) -> anyhow::Result<()> + Send>;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("initial state is invalid: {0}")]
    InvalidInitialState(#[source] ValidationError),

    #[error("init callback failed: {0:#}")]
    Init(anyhow::Error),

    #[error("browser state rejected at startup: {0}")]
    Bootstrap(#[source] TransitionError),

    #[error("state runtime stopped before the first browser state arrived")]
    Closed,
}

/// Everything [`run`] needs.
pub struct RunConfig {
    schema: Schema,
    initial_state: State,
    transition_reducer: Option<TransitionReducer>,
    subscribe: Option<Listener>,
    init: Option<InitFn>,
    should_serialize_key: Option<KeyFilter>,
    should_push: Option<PushPolicy>,
    paths: PathCodec,
    history: Option<Arc<dyn History>>,
    flush_timeout: Duration,
}

impl RunConfig {
    pub fn new(schema: Schema, initial_state: State) -> Self {
        Self {
            schema,
            initial_state,
            transition_reducer: None,
            subscribe: None,
            init: None,
            should_serialize_key: None,
            should_push: None,
            paths: PathCodec::default(),
            history: None,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Schema, paths and flush timeout from `settings`.
    pub fn from_settings(settings: &Settings, initial_state: State) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.schema()?, initial_state)
            .paths(settings.path_codec()?)
            .flush_timeout(settings.flush_timeout()))
    }

    /// Applied to every computed state before validation.
    pub fn transition_reducer<F>(mut self, reducer: F) -> Self
    where
        F: Fn(State) -> State + Send + Sync + 'static,
    {
        self.transition_reducer = Some(Arc::new(reducer));
        self
    }

    /// Observer registered before anything else, called with the initial state.
    pub fn subscribe<F>(mut self, listener: F) -> Self
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.subscribe = Some(Arc::new(listener));
        self
    }

    /// Called once the first browser state has been merged, before [`run`] returns.
    pub fn init<F>(mut self, init: F) -> Self
    where
        F: FnOnce(&StateContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    /// Keys for which `filter` returns `false` stay out of the URL.
    pub fn should_serialize_key<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.should_serialize_key = Some(Arc::new(filter));
        self
    }

    /// `(old, new) -> push?`; `false` replaces the current entry.
    pub fn should_push<F>(mut self, policy: F) -> Self
    where
        F: Fn(&State, &State) -> bool + Send + Sync + 'static,
    {
        self.should_push = Some(Arc::new(policy));
        self
    }

    pub fn paths(mut self, paths: PathCodec) -> Self {
        self.paths = paths;
        self
    }

    /// Defaults to a fresh [`MemoryHistory`] at `/`.
    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("schema", &self.schema.name())
            .field("initial_state", &self.initial_state)
            .field("paths", &self.paths)
            .field("flush_timeout", &self.flush_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle to a running state runtime.
#[derive(Clone)]
pub struct StateContext {
    engine: Arc<TransitionEngine>,
    adapter: Arc<BrowserAdapter>,
    shutdown: ShutdownHandle,
    listener: ListenerId,
}

impl StateContext {
    /// The live state.
    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn cell(&self) -> &StateCell {
        self.engine.cell()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.engine.cell().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.engine.cell().unsubscribe(id)
    }

    pub fn transition(&self, patch: impl Into<Patch>) -> Result<(), TransitionError> {
        self.engine.transition(patch)
    }

    pub fn transition_with_id(
        &self,
        id: impl Into<String>,
        patch: impl Into<Patch>,
    ) -> Result<(), TransitionError> {
        self.engine.transition_with_id(id, patch)
    }

    pub fn dry_run(&self, patch: impl Into<Patch>) -> Result<DryRun, TransitionError> {
        self.engine.dry_run(patch)
    }

    pub fn history(&self) -> &Arc<dyn History> {
        self.adapter.history()
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    /// Stop reacting to navigations. Transitions still work afterwards but
    /// browser writes are never confirmed.
    pub fn shutdown(&self) {
        self.adapter.remove_listener(self.listener);
        self.shutdown.signal();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("engine", &self.engine)
            .field("adapter", &self.adapter)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

/// Start the state runtime.
///
/// Must be called inside a tokio runtime. Resolves after the current browser
/// location has been merged into the initial state and `init` has run.
pub async fn run(config: RunConfig) -> Result<StateContext, RunError> {
    let schema = Arc::new(config.schema);
    let initial = schema.apply_defaults(config.initial_state);
    schema
        .validate(&initial)
        .map_err(RunError::InvalidInitialState)?;

    let cell = StateCell::new(initial);
    if let Some(listener) = config.subscribe {
        cell.subscribe_arc(listener);
    }

    let history = config
        .history
        .unwrap_or_else(|| Arc::new(MemoryHistory::new()));
    let mut adapter = BrowserAdapter::new(history, config.paths.clone(), Arc::clone(&schema));
    if let Some(filter) = config.should_serialize_key {
        adapter = adapter.with_key_filter(filter);
    }
    if let Some(policy) = config.should_push {
        adapter = adapter.with_push_policy(policy);
    }
    let adapter = Arc::new(adapter);

    let mut builder = TransitionEngine::builder(cell, Arc::clone(&schema), adapter.clone())
        .paths(config.paths)
        .flush_timeout(config.flush_timeout);
    if let Some(reducer) = config.transition_reducer {
        builder = builder.reducer(reducer);
    }
    let engine = builder.build();

    let (tx, rx) = mpsc::unbounded_channel();
    let listener = adapter.on_browser_change(move |change| {
        // The receiver is gone only after shutdown.
        let _ = tx.send(change);
    });

    let shutdown = ShutdownHandle::new();
    let context = StateContext {
        engine: Arc::clone(&engine),
        adapter: Arc::clone(&adapter),
        shutdown: shutdown.clone(),
        listener,
    };

    let (ready_tx, ready_rx) = oneshot::channel();
    let driver = Driver {
        engine,
        adapter,
        schema,
    };
    tokio::spawn(driver.drive(rx, shutdown, ready_tx));

    match ready_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            context.shutdown();
            return Err(RunError::Bootstrap(err));
        }
        Err(_) => return Err(RunError::Closed),
    }

    if let Some(init) = config.init {
        if let Err(err) = init(&context) {
            context.shutdown();
            return Err(RunError::Init(err));
        }
    }

    info!(state = ?context.state(), "State runtime ready");
    Ok(context)
}

/// Consumes browser changes for one runtime.
struct Driver {
    engine: Arc<TransitionEngine>,
    adapter: Arc<BrowserAdapter>,
    schema: Arc<Schema>,
}

impl Driver {
    async fn drive(
        self,
        mut changes: mpsc::UnboundedReceiver<BrowserChange>,
        shutdown: ShutdownHandle,
        ready: oneshot::Sender<Result<(), TransitionError>>,
    ) {
        let mut ready = Some(ready);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                change = changes.recv() => {
                    let Some(change) = change else {
                        break;
                    };
                    let result = self.handle(change, ready.is_some());
                    match ready.take() {
                        Some(ready) => {
                            let _ = ready.send(result);
                        }
                        None => {
                            if let Err(err) = result {
                                warn!(%err, "Ignoring browser state");
                            }
                        }
                    }
                }
            }
        }
        debug!("Browser change loop stopped");
    }

    fn handle(&self, change: BrowserChange, bootstrap: bool) -> Result<(), TransitionError> {
        debug!(
            action = %change.action,
            url = %change.location.href(),
            bootstrap,
            "Browser change"
        );

        if self.engine.is_pending() {
            if change.action != Action::Pop {
                self.engine.confirm();
                return Ok(());
            }
            // Back/forward while our own write was in flight.
            self.engine.abandon_pending();
        }

        let merged = self.merge(&self.engine.state(), change.state, bootstrap);
        match change.action {
            Action::Push => self.engine.transition(Patch::replace_with(merged)),
            Action::Pop | Action::Replace => self.accept(merged),
        }
    }

    /// The browser already shows `merged`: publish it without writing back,
    /// unless cleanup or the reducer changed it.
    fn accept(&self, merged: State) -> Result<(), TransitionError> {
        let DryRun { state, changed } = self.engine.dry_run(Patch::replace_with(merged.clone()))?;

        if !shallow_equal(&state, &merged) {
            debug!("Browser state needs cleanup, replacing history entry");
            self.adapter
                .sync_to_browser(&self.adapter.serializable(&state), false);
            if changed {
                self.engine.publish_external(state);
            } else {
                self.engine.drain_queue();
            }
        } else if changed {
            self.engine.publish_external(state);
        } else {
            self.engine.drain_queue();
        }
        Ok(())
    }

    /// Overlay the schema-valid browser fields on `current`.
    ///
    /// After startup the URL is authoritative for serializable optional
    /// keys: one missing from the URL is removed.
    fn merge(&self, current: &State, browser: State, bootstrap: bool) -> State {
        let (valid, dropped): (State, State) = browser
            .into_iter()
            .partition(|(k, v)| self.schema.is_valid_field(k, v));
        if !dropped.is_empty() {
            let dropped: Vec<&String> = dropped.keys().collect();
            debug!(?dropped, "Dropping invalid browser fields");
        }

        let mut next = current.clone();
        if !bootstrap {
            next.retain(|key, _| {
                valid.contains_key(key)
                    || self.schema.is_required(key)
                    || !self.adapter.should_serialize_key(key)
            });
        }
        next.extend(valid);
        next
    }
}
