//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber
//! - Resolve the log filter (`RUST_LOG` first, then config/CLI)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Pretty fmt output; fields carry addresses, URLs and errors

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `default_filter` applies when `RUST_LOG` is unset.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed (e.g., by an embedding application).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
