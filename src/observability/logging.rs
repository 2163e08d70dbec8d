//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honour `RUST_LOG`, falling back to the configured filter
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Components log fields (`path`, `pattern`, `epoch`), not formatted text

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor config provides one.
pub const DEFAULT_FILTER: &str = "routekit=debug,tower_http=debug";

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(fallback_filter: &str) {
    let fallback = if fallback_filter.trim().is_empty() {
        DEFAULT_FILTER
    } else {
        fallback_filter
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
