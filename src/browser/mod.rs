//! Browser side: a navigation history and the adapter that reads state from
//! it and writes state to it.

mod adapter;
mod history;

pub use adapter::{BrowserAdapter, BrowserChange, KeyFilter, PushPolicy};
pub use history::{Action, History, HistoryListener, ListenerId, Location, MemoryHistory};
