//! Optional `tracing-subscriber` bootstrap.
//!
//! The library itself never installs a global subscriber — only binaries and
//! tests should call this. It exists so every embedder gets the same
//! env-filter-driven format the rest of the corpus uses.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber reading `RUST_LOG` (defaulting to `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
