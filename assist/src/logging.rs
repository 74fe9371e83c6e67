//! Diagnostic tracing for the assist pipeline.
//!
//! Everything goes to stderr so stdout stays free for `--json` summaries.
//! Operator-facing warnings (skipped commands, rewritten paths, unresolved
//! errors) are emitted at `warn` and show with the default filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,assist=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `warn,assist=info`. Compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=assist=debug assist apply response.md
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
