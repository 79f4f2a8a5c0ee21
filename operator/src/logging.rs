//! Diagnostic tracing for debugging the operator.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: dev diagnostics via `RUST_LOG`, output to stderr.
//!   Not part of the operator's product output.
//!
//! - **Notices (`report`)**: progress and failure lines for the operator on
//!   stdout. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, so skipped-test and
/// spawn details stay hidden unless asked for.
///
/// # Example
/// ```bash
/// RUST_LOG=atomic_operator=debug atomic-operator run --technique T1070.003
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
