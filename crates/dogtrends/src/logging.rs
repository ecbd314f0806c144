//! Diagnostic logging. Command output owns stdout, so every trace line goes
//! to stderr and stays silent unless `RUST_LOG` asks for it.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber. A second call, or a subscriber already
/// installed by a test harness, is left in place.
pub fn init_logging() {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_filter(env_filter());

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}
