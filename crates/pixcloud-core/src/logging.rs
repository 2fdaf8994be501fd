//! Logging setup shared by pixcloud binaries and tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with pixcloud defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// `RUST_LOG` still wins when it is set. Safe to call more than once; later
/// calls are ignored.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .try_init();
}

/// Map a `--log-level` style name onto a filter directive.
///
/// Unknown names fall back to `info`.
pub fn level_filter(name: &str) -> &'static str {
    match name.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}
