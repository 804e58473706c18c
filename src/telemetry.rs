//! logging setup shared by the cli and the server

use std::env;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// pick the filter directive: `RUST_LOG`, then `LOG_LEVEL`, then `default_level`
pub fn log_filter(default_level: &str) -> String {
    env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env::var("LOG_LEVEL").ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| default_level.to_string())
}

/// install the global subscriber; later calls are no-ops
pub fn init_logging(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let directive = log_filter(default_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init();
}
