//! Tracing subscriber bootstrap for embedders that don't already have one
//! installed (library code never initializes a subscriber on its own
//! behalf; this is an opt-in convenience for binaries built on top of
//! [`crate::Grizzly`]).

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber honoring `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
