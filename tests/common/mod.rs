//! Shared test utilities.

#![allow(dead_code, unused_imports)]

use navstate::browser::{History, MemoryHistory};
use navstate::codec::{PathCodec, PathPattern};
use navstate::{run, FieldType, RunConfig, Schema, State, StateContext};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub type Published = Arc<Mutex<Vec<State>>>;

/// `view` is one of view1, view2, user; `user` owns the `user/:userId` path.
pub fn app_schema() -> Schema {
    Schema::builder("AppState")
        .required(
            "view",
            FieldType::Enum(vec!["view1".into(), "view2".into(), "user".into()]),
        )
        .optional("foo", FieldType::String)
        .optional("bar", FieldType::Number)
        .optional("flag", FieldType::Boolean)
        .optional("userId", FieldType::Number)
        .build()
        .expect("valid schema")
}

pub fn app_paths() -> PathCodec {
    PathCodec::from_patterns(vec![
        PathPattern::new("user", "user/:userId").expect("valid pattern")
    ])
}

pub fn history(urls: &[&str]) -> Arc<MemoryHistory> {
    Arc::new(MemoryHistory::with_entries(urls))
}

/// Config over `history` that records every published state.
pub fn config(history: Arc<dyn History>, initial: State) -> (RunConfig, Published) {
    let published: Published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    let config = RunConfig::new(app_schema(), initial)
        .paths(app_paths())
        .history(history)
        .subscribe(move |s| sink.lock().push(s.clone()));
    (config, published)
}

pub async fn start(history: Arc<MemoryHistory>, initial: State) -> (StateContext, Published) {
    let (config, published) = config(history, initial);
    let ctx = run(config).await.expect("runtime starts");
    (ctx, published)
}

/// Let the driver task process queued browser changes.
///
/// Under a paused clock the sleep completes only once every other task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
