//! Development-time tracing for debugging the synchronizer.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to stderr.
//!   Not part of the operator-facing output.
//!
//! - **Agent logs (`View::logs`)**: Mirrored from the remote agent each poll.
//!   Always shown to the operator, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used by the CLI when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var, falling back to `default_filter` when it is unset
/// or unparsable. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=overseer=debug cargo run -- watch
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
