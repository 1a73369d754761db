//! Opt-in diagnostics.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the filter directive, e.g. `navstate=debug`.
pub const LOG_ENV: &str = "NAVSTATE_LOG";

/// Install a stderr `fmt` subscriber filtered by `NAVSTATE_LOG`.
///
/// Does nothing when the variable is unset or a global subscriber is
/// already installed. Returns whether this call installed one.
pub fn init_tracing() -> bool {
    let Ok(directive) = std::env::var(LOG_ENV) else {
        return false;
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        eprintln!("Warning: invalid {} directive '{}', using 'info'", LOG_ENV, directive);
        EnvFilter::new("info")
    });

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok()
}
