//! Structured logging setup
//!
//! Log events go to stderr so that stdout carries only the JSON response.
//! `RUST_LOG` takes precedence over the verbosity flag.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "skycache=debug"
    } else {
        "warn"
    }
}

/// Installs the global tracing subscriber
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
