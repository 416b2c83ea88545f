//! Tracing initialization shared by the `master` and `slave` binaries.
//!
//! Mirrors the teacher's `tracing-utils` crate: one call at the top of
//! `main`, env-filter driven, JSON-capable for production, pretty for a
//! terminal.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `verbose` corresponds to the `-v` CLI flag from spec.md §6: it raises
/// the default filter from `info` to `debug` when no `RUST_LOG` override is
/// present.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
