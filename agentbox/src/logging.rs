//! Diagnostic tracing for the `ai` binary.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, written to stderr.
//!   Not part of the product output.
//! - **Run report (`report`)**: what the run produced, printed to stdout.
//!   Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `warn`, or
/// `warn,agentbox=debug` with `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=agentbox=trace ai plan "add caching"
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,agentbox=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
