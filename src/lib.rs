//! Subscriber intake: `POST /subscribers` validates a subscriber and queues its creation,
//! a pool of workers later persists it.

pub mod app;
pub mod config;
pub mod database;
mod error;
pub mod queue;
pub mod web;
pub mod worker;

// re-exports
pub use app::{App, AppState};
pub use error::{Error, Result};

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Human readable logs for development. Respects `RUST_LOG`, defaults to `debug` for this crate.
pub fn init_dbg_tracing() {
    tracing_subscriber::fmt()
        .without_time()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("subscriber_intake=debug,tower_http=debug,info")),
        )
        .compact()
        .init();
}

/// JSON logs for production. Respects `RUST_LOG`, defaults to `info`.
pub fn init_production_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
